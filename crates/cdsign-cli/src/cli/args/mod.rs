use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;


#[derive(Parser)]
#[command(
    name = "cdsign",
    version,
    about = "Digest, sign and verify component descriptors stored in OCI registries"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Digest a component graph, sign it and upload it to a target repository
    Sign(SignArgs),
    /// Verify an RSA signature and every digest of the graph
    VerifyRsa(VerifyKeyArgs),
    /// Verify an Ed25519 signature and every digest of the graph
    VerifyEd25519(VerifyKeyArgs),
    /// Verify against a remote attestation service
    VerifyNotary(VerifyNotaryArgs),
    /// Fill in missing digests of a component graph
    AddDigests(AddDigestsArgs),
    /// Re-derive and check every digest of a component graph
    CheckDigests(CheckDigestsArgs),
    /// Compare resource digests of one component in two repositories
    Compare(CompareArgs),
}

/// Component coordinates shared by all commands.
#[derive(Args, Debug, Clone)]
pub struct ComponentArgs {
    /// Base URL of the repository holding the component descriptors
    pub base_url: String,

    /// Component name
    pub component: String,

    /// Component version
    pub version: String,
}

/// Registry connection options.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Bearer token for the registry
    #[arg(long, env = "CDSIGN_REGISTRY_TOKEN", hide_env_values = true)]
    pub registry_token: Option<String>,

    /// Use plain HTTP for registries given without a scheme
    #[arg(long, env = "CDSIGN_PLAIN_HTTP")]
    pub plain_http: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "CDSIGN_REGISTRY_TIMEOUT", default_value_t = 30)]
    pub registry_timeout: u64,

    /// Overall deadline for the command in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("signer")
        .args(["keyfile", "signing_server_config", "attestation_config"])
        .multiple(false)
))]
pub struct SignArgs {
    #[command(flatten)]
    pub component: ComponentArgs,

    /// PEM private key (RSA PKCS#1/PKCS#8 or Ed25519 PKCS#8)
    #[arg(long)]
    pub keyfile: Option<PathBuf>,

    /// YAML config of a remote signing server (url, username, password)
    #[arg(long)]
    pub signing_server_config: Option<PathBuf>,

    /// YAML config of an attestation service (url, jwt)
    #[arg(long)]
    pub attestation_config: Option<PathBuf>,

    /// Name the signature is stored under
    #[arg(long)]
    pub signature_name: String,

    /// Repository the signed descriptors are uploaded to
    #[arg(long)]
    pub upload_base_url: String,

    /// Sign every descriptor of the graph, not only the root
    #[arg(long)]
    pub recursive: bool,

    /// Only add digests and upload, without signing
    #[arg(long)]
    pub skip_signing: bool,

    /// Access types whose resources are excluded from the signature
    #[arg(long = "skip-access-type", value_delimiter = ',')]
    pub skip_access_types: Vec<String>,

    /// Hash algorithm for all digests
    #[arg(long, default_value = "sha256")]
    pub hash_algorithm: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyKeyArgs {
    #[command(flatten)]
    pub component: ComponentArgs,

    /// Public key file (PEM, or Base64 SPKI for Ed25519)
    #[arg(long)]
    pub public_key: PathBuf,

    /// Name of the signature to verify
    #[arg(long)]
    pub signature_name: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyNotaryArgs {
    #[command(flatten)]
    pub component: ComponentArgs,

    /// YAML config of the attestation service (verifyUrl, token)
    #[arg(long)]
    pub config: PathBuf,

    /// Name of the signature to verify
    #[arg(long)]
    pub signature_name: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AddDigestsArgs {
    #[command(flatten)]
    pub component: ComponentArgs,

    /// Upload the digested descriptors here; prints the root otherwise
    #[arg(long)]
    pub upload_base_url: Option<String>,

    /// Access types whose resources are excluded from the signature
    #[arg(long = "skip-access-type", value_delimiter = ',')]
    pub skip_access_types: Vec<String>,

    /// Hash algorithm for all digests
    #[arg(long, default_value = "sha256")]
    pub hash_algorithm: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CheckDigestsArgs {
    #[command(flatten)]
    pub component: ComponentArgs,

    /// Hash algorithm the digests were computed with
    #[arg(long, default_value = "sha256")]
    pub hash_algorithm: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Base URL of the first repository
    pub base_url_first: String,

    /// Base URL of the second repository
    pub base_url_second: String,

    /// Component name
    pub component: String,

    /// Component version
    pub version: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}
