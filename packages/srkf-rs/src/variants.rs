//! Filter variant registry: every update rule paired with every orthogonalization kernel.

use crate::error::{Result, SrkfError};
use crate::kernel::KernelKind;
use crate::update::UpdateRule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of registered variants (3 update rules x 3 kernels)
pub const VARIANT_COUNT: usize = UpdateRule::ALL.len() * KernelKind::ALL.len();

/// Separator between rule and kernel in the string form
pub const SEPARATOR: char = '_';

/// One of the nine square-root filter variants, e.g. `Potter_GramSchmidt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantId {
    pub rule: UpdateRule,
    pub kernel: KernelKind,
}

impl VariantId {
    pub const fn new(rule: UpdateRule, kernel: KernelKind) -> Self {
        Self { rule, kernel }
    }

    /// All variants, rule-major: Potter_*, Carlson_*, Bierman_*.
    pub fn all() -> impl Iterator<Item = VariantId> {
        UpdateRule::ALL
            .into_iter()
            .flat_map(|rule| KernelKind::ALL.into_iter().map(move |kernel| VariantId::new(rule, kernel)))
    }

    pub fn name(&self) -> String {
        format!("{}{}{}", self.rule.as_str(), SEPARATOR, self.kernel.as_str())
    }

    /// Position in [`VariantId::all`] order
    pub fn position(&self) -> usize {
        let r = UpdateRule::ALL.iter().position(|r| *r == self.rule).unwrap_or(0);
        let k = KernelKind::ALL.iter().position(|k| *k == self.kernel).unwrap_or(0);
        r * KernelKind::ALL.len() + k
    }

    pub fn metadata(&self) -> VariantMetadata {
        VariantMetadata {
            name: self.name(),
            rule: self.rule,
            kernel: self.kernel,
            position: self.position(),
            rule_documentation: self.rule.documentation(),
            kernel_documentation: self.kernel.documentation(),
        }
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.rule, SEPARATOR, self.kernel)
    }
}

impl FromStr for VariantId {
    type Err = SrkfError;

    /// Accepts `Rule_Kernel`, case-insensitive (`bierman_householder`).
    fn from_str(s: &str) -> Result<Self> {
        let unknown = || {
            SrkfError::Validation(format!(
                "Unknown variant '{}'. Expected <Potter|Carlson|Bierman>_<GramSchmidt|Givens|Householder>",
                s
            ))
        };
        let (rule, kernel) = s.trim().split_once(SEPARATOR).ok_or_else(unknown)?;
        let rule: UpdateRule = rule.parse().map_err(|_| unknown())?;
        let kernel: KernelKind = kernel.parse().map_err(|_| unknown())?;
        Ok(VariantId::new(rule, kernel))
    }
}

impl Serialize for VariantId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for VariantId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Variant metadata for listings
#[derive(Debug, Clone, Serialize)]
pub struct VariantMetadata {
    pub name: String,
    pub rule: UpdateRule,
    pub kernel: KernelKind,
    pub position: usize,
    pub rule_documentation: &'static str,
    pub kernel_documentation: &'static str,
}

impl VariantMetadata {
    /// Look up variant by name
    pub fn from_name(name: &str) -> Option<VariantMetadata> {
        name.parse::<VariantId>().ok().map(|v| v.metadata())
    }

    /// Look up variant by position
    pub fn from_position(pos: usize) -> Option<VariantMetadata> {
        VariantId::all().nth(pos).map(|v| v.metadata())
    }

    pub fn registry() -> Vec<VariantMetadata> {
        VariantId::all().map(|v| v.metadata()).collect()
    }
}
