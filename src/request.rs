//! Generation request model and construction-time validation.
//!
//! A [`GenerationRequest`] can only be obtained through
//! [`GenerationRequestBuilder::build`], so every value handed to the transport
//! has already passed the same checks the service applies.
//!
//! # Example
//!
//! ```
//! use napkin_core::{GenerationRequest, OutputFormat};
//!
//! let request = GenerationRequest::builder("Machine Learning Pipeline")
//!     .format(OutputFormat::Raster)
//!     .width(1024)
//!     .variations(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(request.variations(), 2);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Maximum characters in the main content.
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Maximum characters in a context string or selection query.
pub const MAX_SHORT_TEXT_CHARS: usize = 5_000;

/// Allowed range for the number of variations.
pub const VARIATIONS_RANGE: std::ops::RangeInclusive<u8> = 1..=4;

/// Allowed range for raster width/height in pixels.
pub const DIMENSION_RANGE: std::ops::RangeInclusive<u32> = 100..=4096;

/// Default language tag.
pub const DEFAULT_LANGUAGE: &str = "en-US";

static LANGUAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("language regex is valid")
});

static IDENTIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9_\-]{8,64}$").expect("identifier regex is valid")
});

/// Output format of a generated visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Scalable vector output (`svg` on the wire).
    #[default]
    #[serde(rename = "svg")]
    Vector,
    /// Bitmap output (`png` on the wire).
    #[serde(rename = "png")]
    Raster,
}

impl OutputFormat {
    /// Wire name of the format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "svg",
            Self::Raster => "png",
        }
    }

    /// File extension (without the dot) for artifacts of this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// MIME type for artifacts of this format.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Vector => "image/svg+xml",
            Self::Raster => "image/png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" | "vector" => Ok(Self::Vector),
            "png" | "raster" => Ok(Self::Raster),
            _ => Err(ValidationError::UnknownFormat(s.to_string())),
        }
    }
}

/// Which existing visuals, if any, the generation should be based on.
///
/// Exactly one case is active. List cases must hold one entry per variation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// No reference selection.
    #[default]
    None,
    /// A single visual id.
    Id(String),
    /// One visual id per variation.
    Ids(Vec<String>),
    /// A single visual type query.
    Query(String),
    /// One visual type query per variation.
    Queries(Vec<String>),
}

/// Construction-time validation failures for [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Content was empty or whitespace.
    #[error("content must not be empty")]
    EmptyContent,

    /// A text field exceeded its character limit.
    #[error("{field} exceeds {max} characters (got {actual})")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum allowed characters.
        max: usize,
        /// Actual character count.
        actual: usize,
    },

    /// An optional text field was present but empty.
    #[error("{field} must not be empty when provided")]
    EmptyField {
        /// Field name.
        field: &'static str,
    },

    /// Variation count outside 1..=4.
    #[error("number of variations must be between 1 and 4 (got {0})")]
    Variations(u8),

    /// Width or height set on a non-raster request.
    #[error("width and height can only be set when format is png")]
    DimensionsRequireRaster,

    /// Width or height outside 100..=4096.
    #[error("{field} must be between 100 and 4096 pixels (got {value})")]
    Dimension {
        /// `width` or `height`.
        field: &'static str,
        /// Rejected value.
        value: u32,
    },

    /// Language tag is not BCP-47 shaped.
    #[error("invalid language tag: {0}")]
    Language(String),

    /// Style or visual id is not 8..64 characters of `[A-Za-z0-9_-]`.
    #[error("invalid {field}: {value}")]
    Identifier {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A list selection was empty.
    #[error("{field} must not be empty")]
    EmptySelection {
        /// Field name.
        field: &'static str,
    },

    /// A list selection length did not match the variation count.
    #[error("{field} has {actual} entries but {expected} variations were requested")]
    SelectionLength {
        /// Field name.
        field: &'static str,
        /// Variation count.
        expected: usize,
        /// List length.
        actual: usize,
    },

    /// Unrecognized output format string.
    #[error("unknown output format: {0} (expected svg or png)")]
    UnknownFormat(String),
}

/// A validated request for the visual generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    content: String,
    format: OutputFormat,
    style_id: Option<String>,
    language: String,
    variations: u8,
    width: Option<u32>,
    height: Option<u32>,
    transparent_background: bool,
    inverted_color: bool,
    context_before: Option<String>,
    context_after: Option<String>,
    selection: Selection,
}

impl GenerationRequest {
    /// Starts building a request for the given content.
    #[must_use]
    pub fn builder(content: impl Into<String>) -> GenerationRequestBuilder {
        GenerationRequestBuilder::new(content)
    }

    /// The text to visualize.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Requested output format.
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Style reference, if any.
    #[must_use]
    pub fn style_id(&self) -> Option<&str> {
        self.style_id.as_deref()
    }

    /// Language tag.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Number of variations requested.
    #[must_use]
    pub fn variations(&self) -> u8 {
        self.variations
    }

    /// Raster width in pixels.
    #[must_use]
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    /// Raster height in pixels.
    #[must_use]
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Whether a transparent background was requested.
    #[must_use]
    pub fn transparent_background(&self) -> bool {
        self.transparent_background
    }

    /// Whether inverted colors were requested.
    #[must_use]
    pub fn inverted_color(&self) -> bool {
        self.inverted_color
    }

    /// Reference selection.
    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Number of characters in the content, used for logging instead of the content itself.
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Wire representation of a request. Absent optionals are omitted.
#[derive(Serialize)]
struct WireRequest<'a> {
    content: &'a str,
    format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    style_id: Option<&'a str>,
    language: &'a str,
    number_of_visuals: u8,
    transparent_background: bool,
    inverted_color: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_before: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_after: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visual_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visual_ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visual_query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visual_queries: Option<&'a [String]>,
}

impl Serialize for GenerationRequest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let (visual_id, visual_ids, visual_query, visual_queries) = match &self.selection {
            Selection::None => (None, None, None, None),
            Selection::Id(id) => (Some(id.as_str()), None, None, None),
            Selection::Ids(ids) => (None, Some(ids.as_slice()), None, None),
            Selection::Query(query) => (None, None, Some(query.as_str()), None),
            Selection::Queries(queries) => (None, None, None, Some(queries.as_slice())),
        };
        WireRequest {
            content: &self.content,
            format: self.format,
            style_id: self.style_id.as_deref(),
            language: &self.language,
            number_of_visuals: self.variations,
            transparent_background: self.transparent_background,
            inverted_color: self.inverted_color,
            width: self.width,
            height: self.height,
            context_before: self.context_before.as_deref(),
            context_after: self.context_after.as_deref(),
            visual_id,
            visual_ids,
            visual_query,
            visual_queries,
        }
        .serialize(serializer)
    }
}

/// Builder for [`GenerationRequest`]; all checks run in [`build`](Self::build).
#[derive(Debug, Clone)]
#[must_use]
pub struct GenerationRequestBuilder {
    content: String,
    format: OutputFormat,
    style_id: Option<String>,
    language: Option<String>,
    variations: u8,
    width: Option<u32>,
    height: Option<u32>,
    transparent_background: bool,
    inverted_color: bool,
    context_before: Option<String>,
    context_after: Option<String>,
    selection: Selection,
}

impl GenerationRequestBuilder {
    fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: OutputFormat::default(),
            style_id: None,
            language: None,
            variations: 1,
            width: None,
            height: None,
            transparent_background: false,
            inverted_color: false,
            context_before: None,
            context_after: None,
            selection: Selection::None,
        }
    }

    /// Sets the output format (default vector).
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the style reference.
    pub fn style_id(mut self, style_id: impl Into<String>) -> Self {
        self.style_id = Some(style_id.into());
        self
    }

    /// Sets the language tag (default `en-US`).
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the number of variations (default 1).
    pub fn variations(mut self, variations: u8) -> Self {
        self.variations = variations;
        self
    }

    /// Sets the raster width.
    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Sets the raster height.
    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    /// Requests a transparent background.
    pub fn transparent_background(mut self, transparent: bool) -> Self {
        self.transparent_background = transparent;
        self
    }

    /// Requests inverted colors.
    pub fn inverted_color(mut self, inverted: bool) -> Self {
        self.inverted_color = inverted;
        self
    }

    /// Sets context shown before the content.
    pub fn context_before(mut self, context: impl Into<String>) -> Self {
        self.context_before = Some(context.into());
        self
    }

    /// Sets context shown after the content.
    pub fn context_after(mut self, context: impl Into<String>) -> Self {
        self.context_after = Some(context.into());
        self
    }

    /// Sets the reference selection.
    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Validates every field and produces the request.
    ///
    /// When both width and height are given for a raster request, width wins
    /// and height is dropped.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn build(self) -> Result<GenerationRequest, ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        check_length("content", &self.content, MAX_CONTENT_CHARS)?;
        check_optional_text("context_before", self.context_before.as_deref())?;
        check_optional_text("context_after", self.context_after.as_deref())?;

        if !VARIATIONS_RANGE.contains(&self.variations) {
            return Err(ValidationError::Variations(self.variations));
        }

        let (width, height) = self.resolve_dimensions()?;

        let language = self
            .language
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        if !LANGUAGE_PATTERN.is_match(&language) || language.len() > 35 {
            return Err(ValidationError::Language(language));
        }

        if let Some(style_id) = &self.style_id {
            check_identifier("style_id", style_id)?;
        }

        check_selection(&self.selection, usize::from(self.variations))?;

        Ok(GenerationRequest {
            content: self.content,
            format: self.format,
            style_id: self.style_id,
            language,
            variations: self.variations,
            width,
            height,
            transparent_background: self.transparent_background,
            inverted_color: self.inverted_color,
            context_before: self.context_before,
            context_after: self.context_after,
            selection: self.selection,
        })
    }

    fn resolve_dimensions(&self) -> Result<(Option<u32>, Option<u32>), ValidationError> {
        if self.width.is_none() && self.height.is_none() {
            return Ok((None, None));
        }
        if self.format != OutputFormat::Raster {
            return Err(ValidationError::DimensionsRequireRaster);
        }
        if let Some(width) = self.width {
            check_dimension("width", width)?;
            if self.height.is_some() {
                debug!(width, "width and height both set; keeping width");
            }
            return Ok((Some(width), None));
        }
        if let Some(height) = self.height {
            check_dimension("height", height)?;
        }
        Ok((None, self.height))
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { field, max, actual });
    }
    Ok(())
}

fn check_optional_text(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(text) if text.is_empty() => Err(ValidationError::EmptyField { field }),
        Some(text) => check_length(field, text, MAX_SHORT_TEXT_CHARS),
        None => Ok(()),
    }
}

fn check_dimension(field: &'static str, value: u32) -> Result<(), ValidationError> {
    if DIMENSION_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::Dimension { field, value })
    }
}

fn check_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if IDENTIFIER_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::Identifier {
            field,
            value: value.to_string(),
        })
    }
}

fn check_selection(selection: &Selection, variations: usize) -> Result<(), ValidationError> {
    match selection {
        Selection::None => Ok(()),
        Selection::Id(id) => check_identifier("visual_id", id),
        Selection::Query(query) => check_query("visual_query", query),
        Selection::Ids(ids) => {
            check_list_length("visual_ids", ids.len(), variations)?;
            ids.iter().try_for_each(|id| check_identifier("visual_ids", id))
        }
        Selection::Queries(queries) => {
            check_list_length("visual_queries", queries.len(), variations)?;
            queries
                .iter()
                .try_for_each(|query| check_query("visual_queries", query))
        }
    }
}

fn check_query(field: &'static str, query: &str) -> Result<(), ValidationError> {
    if query.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    check_length(field, query, MAX_SHORT_TEXT_CHARS)
}

fn check_list_length(
    field: &'static str,
    actual: usize,
    expected: usize,
) -> Result<(), ValidationError> {
    if actual == 0 {
        return Err(ValidationError::EmptySelection { field });
    }
    if actual != expected {
        return Err(ValidationError::SelectionLength {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}
