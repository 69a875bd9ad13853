use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lc_core::prelude::*;
use lc_core::ComposerEvent;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SAMPLE_IMAGES: [&str; 3] = ["front.jpg", "living-room.jpg", "garden.jpg"];

fn cli() -> Command {
    Command::new("listing-composer")
        .version(lc_core::VERSION)
        .about("Compose and submit a property listing against in-memory backends")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Walk the wizard, stage photos and submit one listing")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML config file"),
                )
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .default_value("u42")
                        .help("Owner the listing is composed for"),
                )
                .arg(
                    Arg::new("category")
                        .long("category")
                        .default_value("office")
                        .help("Raw category entered in step 1"),
                )
                .arg(
                    Arg::new("fail-upload")
                        .long("fail-upload")
                        .action(ArgAction::Append)
                        .help("Make the upload of this file name fail (repeatable)"),
                )
                .arg(
                    Arg::new("fail-create")
                        .long("fail-create")
                        .action(ArgAction::SetTrue)
                        .help("Make the record backend reject the first submission"),
                )
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .value_parser(["abort-all", "keep-partial"])
                        .help("Override the upload batch policy"),
                )
                .arg(
                    Arg::new("retry")
                        .long("retry")
                        .action(ArgAction::SetTrue)
                        .help("Clear injected failures and submit again after a failure"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli().get_matches().subcommand() {
        Some(("simulate", args)) => simulate(args).await,
        Some((other, _)) => anyhow::bail!("unknown subcommand {other}"),
        None => anyhow::bail!("no subcommand given"),
    }
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<()> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => ComposerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ComposerConfig::new(),
    };
    match args.get_one::<String>("policy").map(String::as_str) {
        Some("keep-partial") => config = config.with_upload_policy(UploadPolicy::KeepPartial),
        Some("abort-all") => config = config.with_upload_policy(UploadPolicy::AbortAll),
        _ => {}
    }

    let owner = OwnerId::new(
        args.get_one::<String>("owner")
            .cloned()
            .unwrap_or_else(|| "u42".to_string()),
    );
    let uploader = Arc::new(MemoryUploader::new());
    let records = Arc::new(MemoryRecordStore::new());
    let failing: Vec<String> = args
        .get_many::<String>("fail-upload")
        .map(|names| names.cloned().collect())
        .unwrap_or_default();
    for name in &failing {
        uploader.fail_on(name.clone());
    }
    if args.get_flag("fail-create") {
        records.fail_with(Some("backend rejected the listing".to_string()));
    }

    let session = ComposerSession::new(
        owner,
        config,
        Collaborators::new(uploader.clone(), records.clone(), Arc::new(MemoryStore::new())),
    );
    if let Some(summary) = session.start().await {
        tracing::info!(saved_at = %summary.saved_at, "found an earlier draft");
    }

    let mut events = session.subscribe();
    let category = args
        .get_one::<String>("category")
        .cloned()
        .unwrap_or_else(|| "office".to_string());
    fill_listing(&session, &category).await?;
    for name in SAMPLE_IMAGES {
        session
            .stage(SourceFile::new(format!("/photos/{name}"), "image/jpeg", 48_000))
            .await?;
    }
    let saved = session.save_draft().await?;
    tracing::info!(step = %saved.current_step, fields = saved.field_count, media = saved.media_count, "draft saved");

    let cancel = CancellationToken::new();
    let mut outcome = session.submit(&cancel).await;
    if let Err(e) = &outcome {
        println!("submission failed: {e}");
        if args.get_flag("retry") {
            for name in &failing {
                uploader.recover(name);
            }
            records.fail_with(None);
            outcome = session.submit(&cancel).await;
        }
    }

    let result = match outcome {
        Ok(receipt) => {
            println!(
                "created record {} with {} image(s) ({} uploaded, {} reused)",
                receipt.record_id, receipt.images, receipt.uploaded, receipt.reused
            );
            if let Ok(ComposerEvent::RecordCreated { record_id, owner_id }) = events.try_recv() {
                tracing::info!(%record_id, %owner_id, "record-created event received");
            }
            if let Some(record) = records.get(&receipt.record_id) {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("giving up: {e}");
            Err(e.into())
        }
    };

    println!("remote files left: {}", uploader.stored().len());
    if let Some(stats) = session.cancel().await {
        tracing::info!(saves = stats.saves, failures = stats.failures, "session closed");
    }
    result
}

async fn fill_listing(session: &ComposerSession, category: &str) -> anyhow::Result<()> {
    let steps: [&[(&str, FieldValue)]; 3] = [
        &[
            ("title", FieldValue::text("Bright corner unit")),
            ("description", FieldValue::text("Two entrances, lots of light")),
            ("category", FieldValue::text(category)),
            ("listing_type", FieldValue::text("rent")),
        ],
        &[
            ("address", FieldValue::text("12 Harbour Road")),
            ("city", FieldValue::text("Portsmouth")),
            ("postal_code", FieldValue::text("PO1 2AB")),
        ],
        &[
            ("price", FieldValue::text("1850")),
            ("area", FieldValue::text("74.5")),
            ("rooms", FieldValue::text("3")),
            ("parking", FieldValue::Flag(true)),
        ],
    ];

    for fields in steps {
        for (key, value) in fields {
            session.set_field(*key, value.clone()).await?;
        }
        let step = session.go_next().await?;
        tracing::debug!(%step, "advanced");
    }
    // media step has no required fields
    session.go_next().await?;
    Ok(())
}
