//! Data model for the scope tree and the permission machinery.
//!
//! Scopes ("contexts") form a tree rooted at the single system context.
//! Each node carries a materialized ancestor path; permission resolution
//! walks that path. The path is typed ([`ContextPath`]); the familiar
//! `/1/5/17` string form exists only at the storage boundary.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Nesting level of a scope. The numeric values are stable storage
/// identifiers; their ordering defines the nesting depth classes
/// (a Course always sits below a Category, a Module below a Course...).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContextLevel {
    /// The tree root. Exactly one system context exists.
    System,
    /// Per-user scope, directly under the system context.
    User,
    /// Course category, possibly nested under the system context.
    Category,
    /// A course inside a category.
    Course,
    /// An activity module inside a course.
    Module,
    /// A block attached to any other scope.
    Block,
}

impl ContextLevel {
    /// Storage representation.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::System => 10,
            Self::User => 30,
            Self::Category => 40,
            Self::Course => 50,
            Self::Module => 70,
            Self::Block => 80,
        }
    }

    /// Inverse of [`as_i16`](Self::as_i16); `None` for unknown values.
    #[must_use]
    pub const fn from_i16(value: i16) -> Option<Self> {
        match value {
            10 => Some(Self::System),
            30 => Some(Self::User),
            40 => Some(Self::Category),
            50 => Some(Self::Course),
            70 => Some(Self::Module),
            80 => Some(Self::Block),
            _ => None,
        }
    }

    /// All levels except [`System`](Self::System), in storage order.
    #[must_use]
    pub const fn non_system() -> [Self; 5] {
        [
            Self::User,
            Self::Category,
            Self::Course,
            Self::Module,
            Self::Block,
        ]
    }
}

/// Permission value attached to a `(capability, role, scope)` override.
///
/// `Prohibit` is absolute: once a role resolves to it at the queried
/// scope, no other role's `Allow` can win. `Inherit` is equivalent to
/// "no explicit row" and is stored as a deletion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Inherit,
    Allow,
    Prevent,
    Prohibit,
}

impl Permission {
    /// Storage representation.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Inherit => 0,
            Self::Allow => 1,
            Self::Prevent => -1,
            Self::Prohibit => -1000,
        }
    }

    /// Inverse of [`as_i32`](Self::as_i32); `None` for unknown values.
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Inherit),
            1 => Some(Self::Allow),
            -1 => Some(Self::Prevent),
            -1000 => Some(Self::Prohibit),
            _ => None,
        }
    }
}

/// Read/write class of a capability, used by the anonymous/guest gate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapType {
    Read,
    Write,
}

impl CapType {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            _ => None,
        }
    }
}

/// Risk bitmask of a capability.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskMask(pub u32);

impl RiskMask {
    pub const NONE: Self = Self(0);
    /// Can change trust relationships.
    pub const MANAGE_TRUST: Self = Self(0x0001);
    /// Can access private data of other subjects.
    pub const PERSONAL: Self = Self(0x0002);
    /// Can mass-message or otherwise spam.
    pub const SPAM: Self = Self(0x0004);
    /// Can inject unfiltered markup/scripts.
    pub const XSS: Self = Self(0x0008);
    /// Can change system configuration.
    pub const CONFIG: Self = Self(0x0010);
    /// Can destroy data.
    pub const DATALOSS: Self = Self(0x0020);

    /// True if any bit of `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Risks that are never extended to anonymous/guest subjects.
    #[must_use]
    pub const fn is_high_risk(self) -> bool {
        self.intersects(Self(Self::XSS.0 | Self::CONFIG.0 | Self::DATALOSS.0))
    }
}

impl BitOr for RiskMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Error parsing the storage form of a [`ContextPath`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed context path: {0:?}")]
pub struct PathParseError(pub String);

/// Materialized ancestor path of a scope: the ordered ids of every
/// ancestor, root first, ending in the node's own id.
///
/// Stored as a slash-delimited string (`/1/5/17`); always non-empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextPath(Vec<i64>);

impl ContextPath {
    /// Path of a root node.
    #[must_use]
    pub fn root(id: i64) -> Self {
        Self(vec![id])
    }

    /// Build a path from its segments. Rejects empty input.
    ///
    /// # Errors
    ///
    /// [`PathParseError`] when `segments` is empty.
    pub fn from_segments(segments: Vec<i64>) -> Result<Self, PathParseError> {
        if segments.is_empty() {
            return Err(PathParseError(String::new()));
        }
        Ok(Self(segments))
    }

    /// Path of a direct child of `self`.
    #[must_use]
    pub fn child(&self, id: i64) -> Self {
        let mut segments = self.0.clone();
        segments.push(id);
        Self(segments)
    }

    /// Ordered segments, root first.
    #[must_use]
    pub fn segments(&self) -> &[i64] {
        &self.0
    }

    /// Id of the node this path belongs to (the last segment).
    #[must_use]
    pub fn leaf(&self) -> i64 {
        self.0.last().copied().unwrap_or_default()
    }

    /// Path of the parent node; `None` for a root path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// The first `n` segments as a path. `n` is clamped to `1..=depth`.
    #[must_use]
    pub fn prefix(&self, n: usize) -> Self {
        let n = n.clamp(1, self.0.len());
        Self(self.0[..n].to_vec())
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> u32 {
        u32::try_from(self.0.len()).unwrap_or(u32::MAX)
    }

    /// True when `self` equals `other` or is one of its ancestors
    /// (a typed prefix match over the segments).
    #[must_use]
    pub fn is_or_contains(&self, other: &Self) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in &self.0 {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}

impl FromStr for ContextPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PathParseError(s.to_owned()));
        };
        let segments = rest
            .split('/')
            .map(|seg| seg.parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PathParseError(s.to_owned()))?;
        Self::from_segments(segments).map_err(|_| PathParseError(s.to_owned()))
    }
}

/// A node of the scope tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextNode {
    /// Immutable id, allocated by the store.
    pub id: i64,
    pub level: ContextLevel,
    /// Reference to the external entity this scope represents
    /// (0 for the system context).
    pub instance_id: i64,
    pub path: ContextPath,
    /// Length of `path` in segments.
    pub depth: u32,
}

impl ContextNode {
    /// Id of the parent context; `None` for the system context.
    #[must_use]
    pub fn parent_id(&self) -> Option<i64> {
        let segments = self.path.segments();
        if segments.len() < 2 {
            return None;
        }
        Some(segments[segments.len() - 2])
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.level == ContextLevel::System
    }
}

/// A row of the static capability catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Unique name, e.g. `course:view`.
    pub name: String,
    pub captype: CapType,
    /// The level this capability is typically overridden at.
    pub context_level: ContextLevel,
    /// Owning component, the catalog-sync unit.
    pub component: String,
    pub risk: RiskMask,
}

/// Declared shape of a capability, fed to catalog sync.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDef {
    pub name: String,
    pub captype: CapType,
    pub context_level: ContextLevel,
    #[serde(default)]
    pub risk: RiskMask,
    /// Former name of this capability; sync migrates override rows from
    /// it so grants survive the rename.
    #[serde(default)]
    pub replaces: Option<String>,
}

/// Outcome of one catalog sync batch. Per-item failures do not abort
/// the batch; they are reported here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSyncReport {
    pub installed: usize,
    pub updated: usize,
    pub removed: usize,
    /// Names of definitions that failed to sync.
    pub failed: Vec<String>,
}

/// A persistent `(role, subject, scope)` grant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role_id: i64,
    pub subject_id: i64,
    pub context_id: i64,
    /// Owning component for plugin-managed assignments; empty for
    /// manual grants.
    pub component: String,
    pub item_id: i64,
}

/// An explicit `(capability, role, scope)` permission override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleOverride {
    pub capability: String,
    pub role_id: i64,
    pub context_id: i64,
    pub permission: Permission,
}

/// The principal a resolution question is asked about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// Not logged in. Resolves through the configured guest subject, if
    /// any, and is always gated to low-risk read capabilities.
    Anonymous,
    User(i64),
}

impl Subject {
    #[must_use]
    pub const fn id(self) -> Option<i64> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }
}
