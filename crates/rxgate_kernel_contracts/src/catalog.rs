#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::authz::SubjectName;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const CATALOG_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatalogItemId(String);

impl CatalogItemId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        if id.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "catalog_item_id",
                reason: "must not be empty",
            });
        }
        if id.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "catalog_item_id",
                reason: "must be <= 64 chars",
            });
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ContractViolation::InvalidValue {
                field: "catalog_item_id",
                reason: "must contain only ascii alphanumerics, '_' or '-'",
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for CatalogItemId {
    fn validate(&self) -> Result<(), ContractViolation> {
        Self::new(self.0.clone()).map(|_| ())
    }
}

/// Catalog row as the surrounding shop hands it in. Whether an item is
/// prescription-gated is static catalog data; the evaluator only reads it.
/// `display_name` doubles as the subject a document must authorize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub schema_version: SchemaVersion,
    pub item_id: CatalogItemId,
    pub display_name: SubjectName,
    pub unit_price_minor: u64,
    pub requires_authorization: bool,
}

impl CatalogItem {
    pub fn v1(
        item_id: CatalogItemId,
        display_name: SubjectName,
        unit_price_minor: u64,
        requires_authorization: bool,
    ) -> Result<Self, ContractViolation> {
        let item = Self {
            schema_version: CATALOG_CONTRACT_VERSION,
            item_id,
            display_name,
            unit_price_minor,
            requires_authorization,
        };
        item.validate()?;
        Ok(item)
    }
}

impl Validate for CatalogItem {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != CATALOG_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "catalog_item.schema_version",
                reason: "must match CATALOG_CONTRACT_VERSION",
            });
        }
        self.item_id.validate()?;
        self.display_name.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_is_bounded_ascii() {
        assert!(CatalogItemId::new("med-042").is_ok());
        assert!(CatalogItemId::new("med 042").is_err());
    }

    #[test]
    fn gated_flag_is_plain_catalog_data() {
        let item = CatalogItem::v1(
            CatalogItemId::new("med-042").unwrap(),
            SubjectName::new("Amoxicillin").unwrap(),
            12_50,
            true,
        )
        .unwrap();
        assert!(item.requires_authorization);
    }
}
