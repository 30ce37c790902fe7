//! `cdsign sign` - digest, sign and upload a component graph.

use anyhow::{bail, Context, Result};
use cdsign_core::signing::{
    publish, sign_graph, signer_from_pem, AttestationSigner, SignOptions, Signer,
    SigningServerSigner,
};
use cdsign_core::RepositoryContext;

use super::{build_engine, digest_options, report_error, resolve_root};
use crate::cli::args::SignArgs;
use crate::exit_codes;

pub async fn cmd_sign(args: SignArgs) -> i32 {
    match run_sign(&args).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn load_signer(args: &SignArgs) -> Result<Option<Box<dyn Signer>>> {
    if let Some(path) = &args.keyfile {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read key file: {}", path.display()))?;
        return Ok(Some(signer_from_pem(&pem)?));
    }
    if let Some(path) = &args.signing_server_config {
        return Ok(Some(Box::new(SigningServerSigner::from_config_file(path)?)));
    }
    if let Some(path) = &args.attestation_config {
        return Ok(Some(Box::new(AttestationSigner::from_config_file(path)?)));
    }
    if args.skip_signing {
        return Ok(None);
    }
    bail!("one of --keyfile, --signing-server-config or --attestation-config is required unless --skip-signing is set")
}

async fn run_sign(args: &SignArgs) -> Result<()> {
    let signer = load_signer(args)?;
    let engine = build_engine(&args.registry)?;

    let mut options = SignOptions::new(&args.signature_name);
    options.recursive = args.recursive;
    options.skip_signing = args.skip_signing;
    options.digest = digest_options(&args.registry, &args.hash_algorithm, &args.skip_access_types);

    let (repository, root) = resolve_root(&engine, &args.component, &options.digest).await?;
    let mut batch = sign_graph(&engine, &root, &repository, signer.as_deref(), &options)
        .await
        .with_context(|| format!("failed to sign {}", root.identity()))?;

    let target = RepositoryContext::oci(&args.upload_base_url);
    publish(&engine, &mut batch, &repository, &target)
        .await
        .with_context(|| format!("failed to upload to {}", target.base_url))?;

    println!(
        "signed {} ({} descriptors uploaded to {})",
        root.identity(),
        batch.len(),
        target.base_url
    );
    Ok(())
}
