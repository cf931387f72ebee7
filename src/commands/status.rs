//! Status command handler: one status check, printed as a summary.

use anyhow::Result;
use napkin_core::{JobRecord, NapkinClient};

use crate::cli::StatusArgs;

pub async fn run_status_command(client: &NapkinClient, args: &StatusArgs) -> Result<()> {
    let job = client.status(&args.job_id).await?;
    print!("{}", render_job(&job));
    Ok(())
}

fn render_job(job: &JobRecord) -> String {
    let mut out = format!("{}\t{}", job.id, job.status);
    if let Some(progress) = job.progress {
        out.push_str(&format!("\t{progress:.0}%"));
    }
    if let Some(message) = job.error.as_deref().or(job.message.as_deref()) {
        out.push('\t');
        out.push_str(message);
    }
    out.push('\n');
    for artifact in &job.artifacts {
        let name = artifact.filename.as_deref().unwrap_or("-");
        out.push_str(&format!(
            "  {}\t{}\t{}\n",
            artifact.id,
            artifact.format,
            name
        ));
    }
    out
}
