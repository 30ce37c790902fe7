//! `cdsign compare` - compare resource digests across two repositories.

use anyhow::Result;
use cdsign_core::{compare, CompareReport, RepositoryContext};

use super::{build_engine, report_error};
use crate::cli::args::CompareArgs;
use crate::exit_codes;

pub async fn cmd_compare(args: CompareArgs) -> i32 {
    match run_compare(&args).await {
        Ok(report) => {
            print!("{}", render(&report));
            exit_codes::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

async fn run_compare(args: &CompareArgs) -> Result<CompareReport> {
    let engine = build_engine(&args.registry)?;
    let report = compare(
        engine.registry().as_ref(),
        &RepositoryContext::oci(&args.base_url_first),
        &RepositoryContext::oci(&args.base_url_second),
        &args.component,
        &args.version,
    )
    .await?;
    Ok(report)
}

fn render(report: &CompareReport) -> String {
    let mut out = String::from("EQUAL\n");
    for path in &report.equal {
        out.push_str(path);
        out.push('\n');
    }
    out.push_str("UNEQUAL\n");
    for path in &report.unequal {
        out.push_str(path);
        out.push('\n');
    }
    out
}
