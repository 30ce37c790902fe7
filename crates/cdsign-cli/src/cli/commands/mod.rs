use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cdsign_core::{
    ComponentDescriptor, DigestOptions, GraphEngine, IntegrityError, RegistryClient,
    RegistryConfig, RegistryError, RepositoryContext,
};

use super::args::{Cli, Command, ComponentArgs, RegistryArgs};
use crate::exit_codes;

pub mod compare;
pub mod digests;
pub mod sign;
pub mod verify;

pub async fn dispatch(cli: Cli) -> i32 {
    match cli.cmd {
        Command::Sign(args) => sign::cmd_sign(args).await,
        Command::VerifyRsa(args) => verify::cmd_verify(args, verify::KeyKind::Rsa).await,
        Command::VerifyEd25519(args) => verify::cmd_verify(args, verify::KeyKind::Ed25519).await,
        Command::VerifyNotary(args) => verify::cmd_verify_notary(args).await,
        Command::AddDigests(args) => digests::cmd_add_digests(args).await,
        Command::CheckDigests(args) => digests::cmd_check_digests(args).await,
        Command::Compare(args) => compare::cmd_compare(args).await,
    }
}

/// Print `e` and map it onto an exit code.
pub(crate) fn report_error(e: &anyhow::Error) -> i32 {
    eprintln!("error: {e:#}");
    exit_code_for(e)
}

pub(crate) fn exit_code_for(e: &anyhow::Error) -> i32 {
    if let Some(err) = e.downcast_ref::<IntegrityError>() {
        err.exit_code()
    } else if let Some(err) = e.downcast_ref::<RegistryError>() {
        err.exit_code()
    } else {
        exit_codes::FAILURE
    }
}

pub(crate) fn build_engine(args: &RegistryArgs) -> anyhow::Result<GraphEngine> {
    let mut config = RegistryConfig::from_env()
        .with_timeout(args.registry_timeout)
        .with_plain_http(args.plain_http);
    if let Some(token) = &args.registry_token {
        config = config.with_token(token);
    }
    tracing::debug!(
        timeout_secs = config.timeout_secs,
        max_retries = config.max_retries,
        plain_http = config.plain_http,
        "registry client configured"
    );
    let client = RegistryClient::new(config).context("failed to create registry client")?;
    Ok(GraphEngine::new(Arc::new(client)))
}

pub(crate) fn digest_options(
    args: &RegistryArgs,
    hash_algorithm: &str,
    skip_access_types: &[String],
) -> DigestOptions {
    let mut options = DigestOptions::default()
        .with_hash_algorithm(hash_algorithm)
        .with_skip_access_types(skip_access_types.iter().cloned());
    if let Some(secs) = args.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    options
}

/// Fetch the root descriptor named by `component`.
pub(crate) async fn resolve_root(
    engine: &GraphEngine,
    component: &ComponentArgs,
    options: &DigestOptions,
) -> anyhow::Result<(RepositoryContext, ComponentDescriptor)> {
    let repository = RepositoryContext::oci(&component.base_url);
    let root = engine
        .resolve(&repository, &component.component, &component.version, options)
        .await?;
    Ok((repository, root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdsign_core::NodeRef;

    #[test]
    fn typed_errors_keep_their_exit_codes() {
        let err = anyhow::Error::new(IntegrityError::MissingDigest {
            node: NodeRef::component("c", "v1"),
        })
        .context("verification failed");
        assert_eq!(exit_code_for(&err), exit_codes::INTEGRITY_VIOLATION);

        let err = anyhow::Error::new(RegistryError::Unauthorized {
            message: "HTTP 401".to_string(),
        });
        assert_eq!(exit_code_for(&err), exit_codes::UNAUTHORIZED);

        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), exit_codes::FAILURE);
    }

    #[test]
    fn digest_options_follow_flags() {
        let args = RegistryArgs {
            timeout: Some(10),
            ..RegistryArgs::default()
        };
        let options = digest_options(&args, "sha512", &["ociRegistry".to_string()]);
        assert_eq!(options.hash_algorithm, "sha512");
        assert!(options.skip_access_types.contains("ociRegistry"));
        assert_eq!(options.deadline.timeout(), Some(Duration::from_secs(10)));
    }
}
