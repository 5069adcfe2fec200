//! `Prefer` header normalization
//!
//! Discrete request fields and a raw `Prefer` string are two ways into the
//! same [`PreferOptions`]; rendering always emits the tokens in one canonical
//! order.

use log::debug;

const RETURN_REPRESENTATION: &str = "return=representation";
const INCLUDE_ANNOTATIONS: &str = "odata.include-annotations";
const MAX_PAGE_SIZE: &str = "odata.maxpagesize";
const TRACK_CHANGES: &str = "odata.track-changes";
const CONTINUE_ON_ERROR: &str = "odata.continue-on-error";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferOptions {
    pub return_representation: bool,
    pub include_annotations: Option<String>,
    pub max_page_size: Option<u32>,
    pub track_changes: bool,
    pub continue_on_error: bool,
}

impl PreferOptions {
    /// Parse a raw `Prefer` value such as `return=representation, odata.maxpagesize=10`
    ///
    /// Unrecognized tokens are dropped.
    pub fn parse(raw: &str) -> Self {
        let mut options = Self::default();

        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token == RETURN_REPRESENTATION {
                options.return_representation = true;
            } else if token == TRACK_CHANGES {
                options.track_changes = true;
            } else if token == CONTINUE_ON_ERROR {
                options.continue_on_error = true;
            } else if let Some(value) = token_value(token, INCLUDE_ANNOTATIONS) {
                let value = value.trim_matches('"');
                if !value.is_empty() {
                    options.include_annotations = Some(value.to_string());
                }
            } else if let Some(value) = token_value(token, MAX_PAGE_SIZE) {
                options.max_page_size = value.trim_matches('"').parse().ok().filter(|n| *n > 0);
            } else {
                debug!("Ignoring unsupported Prefer token: {}", token);
            }
        }

        options
    }

    /// Render in canonical order, `None` when no token applies
    pub fn render(&self) -> Option<String> {
        let mut tokens = Vec::new();

        if self.return_representation {
            tokens.push(RETURN_REPRESENTATION.to_string());
        }
        if let Some(annotations) = self.include_annotations.as_deref().filter(|a| !a.is_empty()) {
            tokens.push(format!("{}=\"{}\"", INCLUDE_ANNOTATIONS, annotations));
        }
        if let Some(size) = self.max_page_size.filter(|n| *n > 0) {
            tokens.push(format!("{}={}", MAX_PAGE_SIZE, size));
        }
        if self.track_changes {
            tokens.push(TRACK_CHANGES.to_string());
        }
        if self.continue_on_error {
            tokens.push(CONTINUE_ON_ERROR.to_string());
        }

        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(","))
        }
    }
}

fn token_value<'a>(token: &'a str, name: &str) -> Option<&'a str> {
    let rest = token.strip_prefix(name)?;
    rest.trim_start().strip_prefix('=').map(str::trim)
}
