//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use napkin_core::{GenerationRequest, OutputFormat, ValidationError};

/// Generate visuals from text with the Napkin API.
///
/// Reads its configuration from `NAPKIN_*` environment variables;
/// `NAPKIN_API_TOKEN` is required.
#[derive(Parser, Debug)]
#[command(name = "napkin")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a generation request, wait for it, and download the results
    Generate(GenerateArgs),

    /// Show the current state of a job
    Status(StatusArgs),
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Text to visualize (1-10000 characters)
    pub content: String,

    /// Output format: svg or png
    #[arg(short, long, default_value_t = OutputFormat::Vector)]
    pub format: OutputFormat,

    /// Style id to render with
    #[arg(short, long)]
    pub style: Option<String>,

    /// Language tag of the content (e.g. en-US)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Number of variations to generate (1-4)
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub variations: u8,

    /// Output width in pixels (png only, 100-4096)
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels (png only, 100-4096; ignored when --width is set)
    #[arg(long)]
    pub height: Option<u32>,

    /// Render with a transparent background
    #[arg(long)]
    pub transparent: bool,

    /// Invert colors (for dark backgrounds)
    #[arg(long)]
    pub inverted: bool,

    /// Text that precedes the content, for context
    #[arg(long)]
    pub context_before: Option<String>,

    /// Text that follows the content, for context
    #[arg(long)]
    pub context_after: Option<String>,

    /// Directory to write generated files into
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Only wait for completion; do not download files
    #[arg(long)]
    pub no_download: bool,
}

impl GenerateArgs {
    /// Builds and validates the request described by these arguments.
    pub fn to_request(&self) -> Result<GenerationRequest, ValidationError> {
        let mut builder = GenerationRequest::builder(self.content.clone())
            .format(self.format)
            .variations(self.variations)
            .transparent_background(self.transparent)
            .inverted_color(self.inverted);
        if let Some(style) = &self.style {
            builder = builder.style_id(style.clone());
        }
        if let Some(language) = &self.language {
            builder = builder.language(language.clone());
        }
        if let Some(width) = self.width {
            builder = builder.width(width);
        }
        if let Some(height) = self.height {
            builder = builder.height(height);
        }
        if let Some(context) = &self.context_before {
            builder = builder.context_before(context.clone());
        }
        if let Some(context) = &self.context_after {
            builder = builder.context_after(context.clone());
        }
        builder.build()
    }
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Job id returned by `generate`
    pub job_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(argv: &[&str]) -> GenerateArgs {
        match Args::try_parse_from(argv).unwrap().command {
            Command::Generate(args) => args,
            Command::Status(_) => panic!("expected generate"),
        }
    }

    #[test]
    fn test_cli_generate_defaults() {
        let args = generate(&["napkin", "generate", "Pipeline"]);
        assert_eq!(args.content, "Pipeline");
        assert_eq!(args.format, OutputFormat::Vector);
        assert_eq!(args.variations, 1);
        assert_eq!(args.output, PathBuf::from("."));
        assert!(!args.no_download);
    }

    #[test]
    fn test_cli_generate_all_flags() {
        let args = generate(&[
            "napkin",
            "generate",
            "Pipeline",
            "--format",
            "png",
            "--style",
            "CDQPRVVJCSTPRBBCD5Q6AWR",
            "--language",
            "fr-FR",
            "-n",
            "2",
            "--width",
            "800",
            "--transparent",
            "--inverted",
            "--context-before",
            "before",
            "--context-after",
            "after",
            "-o",
            "out",
            "--no-download",
        ]);
        assert_eq!(args.format, OutputFormat::Raster);
        assert_eq!(args.variations, 2);
        assert_eq!(args.width, Some(800));
        assert!(args.transparent && args.inverted && args.no_download);

        let request = args.to_request().unwrap();
        assert_eq!(request.format(), OutputFormat::Raster);
        assert_eq!(request.language(), "fr-FR");
        assert_eq!(request.width(), Some(800));
    }

    #[test]
    fn test_cli_generate_rejects_unknown_format() {
        let result = Args::try_parse_from(["napkin", "generate", "x", "--format", "gif"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_variations_range() {
        for value in ["0", "5"] {
            let result = Args::try_parse_from(["napkin", "generate", "x", "-n", value]);
            let err = result.unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_width_on_vector_fails_validation() {
        let args = generate(&["napkin", "generate", "Pipeline", "--width", "800"]);
        assert_eq!(
            args.to_request().unwrap_err(),
            ValidationError::DimensionsRequireRaster
        );
    }

    #[test]
    fn test_cli_status_subcommand() {
        let args = Args::try_parse_from(["napkin", "status", "abc123"]).unwrap();
        match args.command {
            Command::Status(status) => assert_eq!(status.job_id, "abc123"),
            Command::Generate(_) => panic!("expected status"),
        }
    }

    #[test]
    fn test_cli_global_verbosity_flags() {
        let args = Args::try_parse_from(["napkin", "-vv", "status", "abc123"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["napkin", "status", "abc123", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_missing_subcommand_is_error() {
        let result = Args::try_parse_from(["napkin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["napkin", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["napkin", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
