use crate::models::Product;

/// Partitions products into variant groups by product number, preserving
/// first-seen order of groups and of members within each group.
pub fn group_by_product_number(products: &[Product]) -> Vec<Vec<Product>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<Product>> = Vec::new();
    for product in products {
        match order.iter().position(|key| key == &product.product_number) {
            Some(idx) => groups[idx].push(product.clone()),
            None => {
                order.push(product.product_number.clone());
                groups.push(vec![product.clone()]);
            }
        }
    }
    groups
}
