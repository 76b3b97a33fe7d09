use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::models::MenuItem;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MenuQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub available_only: bool,
}

impl MenuQuery {
    /// Stable short digest of the filter set, used in menu cache keys.
    pub fn filter_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.category.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8, u8::from(self.available_only)]);
        hex::encode(&hasher.finalize()[..8])
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestockRequest {
    pub quantity: i32,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct MenuList {
    #[schema(value_type = Vec<MenuItem>)]
    pub items: Vec<MenuItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_hash_is_stable_and_filter_sensitive() {
        let all = MenuQuery::default();
        let drinks = MenuQuery {
            category: Some("drinks".into()),
            available_only: false,
        };
        assert_eq!(all.filter_hash(), MenuQuery::default().filter_hash());
        assert_ne!(all.filter_hash(), drinks.filter_hash());
        assert_ne!(
            drinks.filter_hash(),
            MenuQuery {
                available_only: true,
                ..drinks.clone()
            }
            .filter_hash()
        );
        assert_eq!(all.filter_hash().len(), 16);
    }
}
