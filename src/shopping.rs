// shopping.rs — shopping-cart aggregation and text rendering.

use std::collections::BTreeMap;

use crate::storage::recipes::CartLineRow;

/// One aggregated line of the shopping list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Sum amounts per (name, unit) pair. The same ingredient appearing in
/// several carted recipes becomes one line; output is sorted by name.
pub fn aggregate(lines: &[CartLineRow]) -> Vec<ShoppingItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for line in lines {
        *totals
            .entry((line.name.clone(), line.measurement_unit.clone()))
            .or_insert(0) += line.amount;
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingItem {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

/// Render the downloadable plain-text shopping list.
pub fn format_shopping_list(items: &[ShoppingItem], recipe_names: &[String]) -> String {
    let mut out = String::from("Shopping list:\n");
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} - {} ({})\n",
            i + 1,
            capitalize(&item.name),
            item.amount,
            item.measurement_unit
        ));
    }
    out.push_str("\nRecipes:\n");
    for name in recipe_names {
        out.push_str(&format!("• {name}\n"));
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(name: &str, unit: &str, amount: i64) -> CartLineRow {
        CartLineRow {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn sums_duplicate_ingredients() {
        let items = aggregate(&[
            line("flour", "g", 300),
            line("milk", "ml", 200),
            line("flour", "g", 200),
        ]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "flour");
        assert_eq!(items[0].amount, 500);
        assert_eq!(items[1].name, "milk");
    }

    #[test]
    fn same_name_different_unit_stays_separate() {
        let items = aggregate(&[line("salt", "g", 10), line("salt", "tsp", 1)]);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn renders_numbered_list_with_recipes() {
        let items = aggregate(&[line("flour", "g", 500), line("milk", "ml", 200)]);
        let text = format_shopping_list(&items, &["Pancakes".to_string()]);
        assert!(text.starts_with("Shopping list:\n"));
        assert!(text.contains("1. Flour - 500 (g)\n"));
        assert!(text.contains("2. Milk - 200 (ml)\n"));
        assert!(text.contains("\nRecipes:\n• Pancakes\n"));
    }

    #[test]
    fn empty_cart_renders_headers_only() {
        let text = format_shopping_list(&[], &[]);
        assert_eq!(text, "Shopping list:\n\nRecipes:\n");
    }

    proptest! {
        // Aggregation never loses quantity: the grand total is preserved.
        #[test]
        fn aggregation_preserves_totals(amounts in proptest::collection::vec(1i64..10_000, 0..40)) {
            let names = ["flour", "milk", "eggs", "salt"];
            let lines: Vec<CartLineRow> = amounts
                .iter()
                .enumerate()
                .map(|(i, &a)| line(names[i % names.len()], "g", a))
                .collect();
            let items = aggregate(&lines);
            let total_in: i64 = amounts.iter().sum();
            let total_out: i64 = items.iter().map(|i| i.amount).sum();
            prop_assert_eq!(total_in, total_out);
            prop_assert!(items.len() <= names.len());
        }
    }
}
