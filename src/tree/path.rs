//! Virtual path parsing and normalization
//!
//! Every caller-visible address has the shape
//! `/{appId}/folders/{scope}/{...segments}`.

use crate::error::FsError;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

pub const PREFIX_ERROR: &str = "path needs to start with /appId/folders/...";
pub const FOLDERS_SEGMENT: &str = "folders";
pub const SHARED_SCOPE: &str = "shared";
pub const PERSONAL_SCOPE: &str = "personal";

const MAX_NAME_LEN: usize = 255;

/// Scope a path lives in, taken from the segment after `folders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Shared,
    Personal { account_id: Option<String> },
    Other(String),
}

/// Validated, normalized virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    segments: Vec<String>,
}

/// Normalize a path string for lookup (without validation)
///
/// Normalizes Unicode to NFC and removes trailing slashes (except root).
pub fn normalize_path_string(path: &str) -> String {
    let normalized: String = path.nfc().collect();

    let mut result = normalized;
    if result.len() > 1 {
        while result.ends_with('/') {
            result.pop();
        }
    }

    result
}

/// Check a single node name.
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidArgument(format!("invalid node name '{}'", name)));
    }
    if name.contains('/') || name.chars().any(char::is_control) {
        return Err(FsError::InvalidArgument(format!(
            "node name '{}' contains forbidden characters",
            name.escape_debug()
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::InvalidArgument(format!(
            "node name exceeds {} bytes",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

impl VirtualPath {
    /// Parse and validate a caller-supplied path.
    pub fn parse(raw: &str) -> Result<Self, FsError> {
        if !raw.starts_with('/') {
            return Err(FsError::InvalidArgument(PREFIX_ERROR.to_string()));
        }
        let normalized = normalize_path_string(raw);
        let segments: Vec<String> = normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if segments.len() < 2 || segments[1] != FOLDERS_SEGMENT {
            return Err(FsError::InvalidArgument(PREFIX_ERROR.to_string()));
        }
        for segment in &segments {
            validate_name(segment)?;
        }
        Ok(Self { segments })
    }

    pub fn app_id(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn scope(&self) -> Option<Scope> {
        let scope = self.segments.get(2)?;
        Some(match scope.as_str() {
            SHARED_SCOPE => Scope::Shared,
            PERSONAL_SCOPE => Scope::Personal {
                account_id: self.segments.get(3).cloned(),
            },
            other => Scope::Other(other.to_string()),
        })
    }

    /// Final segment.
    pub fn name(&self) -> &str {
        // parse guarantees at least two segments
        &self.segments[self.segments.len() - 1]
    }

    /// Parent path, if it is itself addressable (`/{app}/folders` or below).
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.segments.len() <= 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The first `len` segments as a path, if that is still addressable.
    pub fn prefix(&self, len: usize) -> Option<VirtualPath> {
        if len < 2 || len > self.segments.len() {
            return None;
        }
        Some(Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// Whether the node at this path sits directly in a scope container.
    pub fn in_scope_container(&self) -> bool {
        self.parent().is_some_and(|p| p.is_scope_container())
    }

    pub fn join(&self, name: &str) -> Result<VirtualPath, FsError> {
        validate_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.nfc().collect());
        Ok(Self { segments })
    }

    /// Whether this path is a scope container: `shared` or `personal/{account}`.
    pub fn is_scope_container(&self) -> bool {
        match self.segments.len() {
            3 => self.segments[2] == SHARED_SCOPE,
            4 => self.segments[2] == PERSONAL_SCOPE,
            _ => false,
        }
    }

    /// True if `self` equals `other` or lies below it.
    pub fn starts_with(&self, other: &VirtualPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// String forms of this path and every ancestor up to `/{app}`.
    pub fn ancestry(&self) -> Vec<String> {
        (1..=self.segments.len())
            .map(|n| format!("/{}", self.segments[..n].join("/")))
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
