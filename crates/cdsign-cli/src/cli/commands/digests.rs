//! `cdsign add-digests|check-digests` - digest maintenance without signatures.

use anyhow::{Context, Result};
use cdsign_core::signing::publish;
use cdsign_core::RepositoryContext;

use super::{build_engine, digest_options, report_error, resolve_root};
use crate::cli::args::{AddDigestsArgs, CheckDigestsArgs};
use crate::exit_codes;

pub async fn cmd_add_digests(args: AddDigestsArgs) -> i32 {
    match run_add_digests(&args).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e),
    }
}

pub async fn cmd_check_digests(args: CheckDigestsArgs) -> i32 {
    match run_check_digests(&args).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e),
    }
}

async fn run_add_digests(args: &AddDigestsArgs) -> Result<()> {
    let engine = build_engine(&args.registry)?;
    let options = digest_options(&args.registry, &args.hash_algorithm, &args.skip_access_types);

    let (repository, root) = resolve_root(&engine, &args.component, &options).await?;
    let mut batch = engine
        .digest_graph(&root, &repository, &options)
        .await
        .with_context(|| format!("failed to digest {}", root.identity()))?;

    match &args.upload_base_url {
        Some(base_url) => {
            let target = RepositoryContext::oci(base_url);
            publish(&engine, &mut batch, &repository, &target)
                .await
                .with_context(|| format!("failed to upload to {base_url}"))?;
            println!(
                "digested {} ({} descriptors uploaded to {base_url})",
                root.identity(),
                batch.len()
            );
        }
        None => {
            let digested = batch.last().context("digest walk returned no descriptors")?;
            println!("{}", serde_json::to_string_pretty(digested)?);
        }
    }
    Ok(())
}

async fn run_check_digests(args: &CheckDigestsArgs) -> Result<()> {
    let engine = build_engine(&args.registry)?;
    let options = digest_options(&args.registry, &args.hash_algorithm, &[]);

    let (repository, root) = resolve_root(&engine, &args.component, &options).await?;
    let checked = engine.check_graph(&root, &repository, &options).await?;

    println!(
        "digests of {} are valid ({} descriptors checked)",
        root.identity(),
        checked.len()
    );
    Ok(())
}
