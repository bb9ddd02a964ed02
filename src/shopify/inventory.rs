use crate::shopify::client::{AdminClient, ShopifyError, user_errors};
use serde_json::{Value, json};
use tracing::warn;

const LOCATIONS: &str = r#"
query { locations(first: 5) { nodes { id name } } }
"#;

const INVENTORY_ACTIVATE: &str = r#"
mutation inventoryActivate($inventoryItemId: ID!, $locationId: ID!) {
  inventoryActivate(inventoryItemId: $inventoryItemId, locationId: $locationId) {
    inventoryLevel { id }
    userErrors { field message }
  }
}
"#;

const INVENTORY_SET_QUANTITIES: &str = r#"
mutation inventorySetQuantities($input: InventorySetQuantitiesInput!) {
  inventorySetQuantities(input: $input) {
    inventoryAdjustmentGroup { reason }
    userErrors { field message }
  }
}
"#;

#[derive(Debug, Clone)]
pub struct Location {
    pub id: String,
    pub name: String,
}

impl AdminClient {
    /// First store location, used for inventory activation. `None` when
    /// the store reports no locations.
    pub async fn primary_location(&self) -> Result<Option<Location>, ShopifyError> {
        let data = self.graphql(LOCATIONS, Value::Null).await?;
        let location = data["locations"]["nodes"]
            .as_array()
            .and_then(|nodes| nodes.first())
            .map(|node| Location {
                id: node["id"].as_str().unwrap_or_default().to_string(),
                name: node["name"].as_str().unwrap_or_default().to_string(),
            });
        Ok(location)
    }

    /// Makes a variant's inventory item stocked at `location_id` and sets
    /// its on-hand quantity. User errors are logged, not returned; a
    /// variant without tracked stock is still a sellable variant.
    pub async fn activate_inventory(
        &self,
        inventory_item_id: &str,
        location_id: &str,
        quantity: i64,
    ) -> Result<(), ShopifyError> {
        let data = self
            .graphql(
                INVENTORY_ACTIVATE,
                json!({
                    "inventoryItemId": inventory_item_id,
                    "locationId": location_id,
                }),
            )
            .await?;
        if let Some(message) = user_errors(&data, "inventoryActivate") {
            warn!(
                target = "flatlay.shopify",
                inventory_item_id, %message, "inventory activation refused"
            );
            return Ok(());
        }

        if quantity <= 0 {
            return Ok(());
        }

        let data = self
            .graphql(
                INVENTORY_SET_QUANTITIES,
                json!({
                    "input": {
                        "reason": "correction",
                        "name": "available",
                        "ignoreCompareQuantity": true,
                        "quantities": [{
                            "inventoryItemId": inventory_item_id,
                            "locationId": location_id,
                            "quantity": quantity,
                        }],
                    }
                }),
            )
            .await?;
        if let Some(message) = user_errors(&data, "inventorySetQuantities") {
            warn!(
                target = "flatlay.shopify",
                inventory_item_id, quantity, %message, "inventory quantity not set"
            );
        }
        Ok(())
    }
}
