//! `cdsign verify-rsa|verify-ed25519|verify-notary` - verify a signed graph.

use anyhow::Result;
use cdsign_core::signing::{AttestationVerifier, Ed25519Verifier, RsaVerifier};
use cdsign_core::{verify_component_descriptor, Verifier, VerifyOptions};

use super::{build_engine, digest_options, report_error, resolve_root};
use crate::cli::args::{ComponentArgs, RegistryArgs, VerifyKeyArgs, VerifyNotaryArgs};
use crate::exit_codes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Rsa,
    Ed25519,
}

pub async fn cmd_verify(args: VerifyKeyArgs, kind: KeyKind) -> i32 {
    match run_verify_key(&args, kind).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e),
    }
}

pub async fn cmd_verify_notary(args: VerifyNotaryArgs) -> i32 {
    match run_verify_notary(&args).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e),
    }
}

async fn run_verify_key(args: &VerifyKeyArgs, kind: KeyKind) -> Result<()> {
    let verifier: Box<dyn Verifier> = match kind {
        KeyKind::Rsa => Box::new(RsaVerifier::from_key_file(&args.public_key)?),
        KeyKind::Ed25519 => Box::new(Ed25519Verifier::from_key_file(&args.public_key)?),
    };
    run_verify(
        &args.component,
        &args.registry,
        &args.signature_name,
        verifier.as_ref(),
    )
    .await
}

async fn run_verify_notary(args: &VerifyNotaryArgs) -> Result<()> {
    let verifier = AttestationVerifier::from_config_file(&args.config)?;
    run_verify(&args.component, &args.registry, &args.signature_name, &verifier).await
}

async fn run_verify(
    component: &ComponentArgs,
    registry: &RegistryArgs,
    signature_name: &str,
    verifier: &dyn Verifier,
) -> Result<()> {
    let engine = build_engine(registry)?;
    // Hash algorithm of the walk is taken from the signature.
    let options = VerifyOptions::new(signature_name)
        .with_digest_options(digest_options(registry, "sha256", &[]));

    let (repository, root) = resolve_root(&engine, component, &options.digest).await?;
    let report =
        verify_component_descriptor(&engine, &root, &repository, verifier, &options).await?;

    println!(
        "verified {} (signature {:?}, {}, {} descriptors checked)",
        report.component,
        report.signature_name,
        report.signature_algorithm,
        report.descriptors_checked
    );
    Ok(())
}
