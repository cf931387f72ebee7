//! Generate command handler: create, wait, download.

use anyhow::Result;
use napkin_core::NapkinClient;
use tracing::{debug, info};

use crate::app::progress_manager::Spinner;
use crate::cli::GenerateArgs;

pub async fn run_generate_command(
    client: &NapkinClient,
    args: &GenerateArgs,
    show_spinner: bool,
) -> Result<()> {
    let request = args.to_request()?;
    debug!(
        content_chars = request.content_len(),
        format = %request.format(),
        variations = request.variations(),
        "request validated"
    );

    let spinner = Spinner::start(show_spinner, "Submitting request...");
    let created = client.create(&request).await?;
    info!(job_id = %created.id, "job created");

    spinner.set_message(format!("Waiting for job {}...", created.id));
    let job = client.await_completion(&created.id).await?;

    if args.no_download {
        drop(spinner);
        println!(
            "{}\t{}\t{} file(s)",
            job.id,
            job.status,
            job.artifacts.len()
        );
        return Ok(());
    }

    spinner.set_message(format!(
        "Downloading {} file(s) to {}...",
        job.artifacts.len(),
        args.output.display()
    ));
    let files = client.download_all(&job, &args.output).await?;
    drop(spinner);

    for file in &files {
        println!(
            "{}\t{}\t{} bytes",
            file.path.display(),
            file.content_type,
            file.bytes_written
        );
    }
    if let Some(quota) = client.quota() {
        debug!(
            limit = quota.limit,
            remaining = quota.remaining,
            "quota after generation"
        );
    }
    Ok(())
}
