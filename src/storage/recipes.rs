// storage/recipes.rs — tags, ingredients, recipes, favorites, shopping carts.

use anyhow::Result;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::{with_timeout, Storage};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngredientRow {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecipeRow {
    pub id: i64,
    pub author_id: i64,
    pub name: String,
    pub text: String,
    pub cooking_time: i64,
    /// Relative media path (`recipes/<uuid>.<ext>`).
    pub image: String,
    /// Lazily generated short-link code. NULL until first get-link call.
    pub short_code: Option<String>,
    pub pub_date: String,
}

/// One ingredient line of a recipe as rendered in the API:
/// the ingredient's identity plus the per-recipe amount.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngredientLineRow {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Raw shopping-cart line before aggregation (one per ingredient per recipe).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLineRow {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Filters for the recipe list endpoint. All optional; combined with AND.
#[derive(Debug, Default, Clone)]
pub struct RecipeFilter {
    pub author: Option<i64>,
    /// OR semantics: a recipe matches when it carries any of these tag slugs.
    pub tag_slugs: Vec<String>,
    pub favorited_by: Option<i64>,
    pub in_cart_of: Option<i64>,
}

fn push_recipe_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &RecipeFilter) {
    if let Some(author) = filter.author {
        qb.push(" AND author_id = ").push_bind(author);
    }
    if !filter.tag_slugs.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM recipe_tags rt
                JOIN tags t ON t.id = rt.tag_id
                WHERE rt.recipe_id = recipes.id AND t.slug IN (",
        );
        let mut sep = qb.separated(", ");
        for slug in &filter.tag_slugs {
            sep.push_bind(slug.clone());
        }
        qb.push("))");
    }
    if let Some(user_id) = filter.favorited_by {
        qb.push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = recipes.id AND f.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
    if let Some(user_id) = filter.in_cart_of {
        qb.push(" AND EXISTS (SELECT 1 FROM shopping_carts sc WHERE sc.recipe_id = recipes.id AND sc.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
}

impl Storage {
    // ─── Tags ───────────────────────────────────────────────────────────────

    pub async fn list_tags(&self) -> Result<Vec<TagRow>> {
        Ok(sqlx::query_as("SELECT * FROM tags ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_tag(&self, id: i64) -> Result<Option<TagRow>> {
        Ok(sqlx::query_as("SELECT * FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Returns `false` when a tag with the same name or slug already existed.
    pub async fn insert_tag(&self, name: &str, slug: &str) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO tags (name, slug) VALUES (?, ?)")
            .bind(name)
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Ingredients ────────────────────────────────────────────────────────

    /// List ingredients, optionally narrowed to a case-insensitive name prefix.
    pub async fn list_ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<IngredientRow>> {
        with_timeout(async {
            let rows = match name_prefix {
                Some(prefix) => {
                    let pattern = format!("{}%", escape_like(prefix));
                    sqlx::query_as(
                        "SELECT * FROM ingredients WHERE name LIKE ? ESCAPE '\\' ORDER BY name ASC",
                    )
                    .bind(pattern)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as("SELECT * FROM ingredients ORDER BY name ASC")
                        .fetch_all(&self.pool)
                        .await?
                }
            };
            Ok(rows)
        })
        .await
    }

    pub async fn get_ingredient(&self, id: i64) -> Result<Option<IngredientRow>> {
        Ok(sqlx::query_as("SELECT * FROM ingredients WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Returns `false` when the (name, unit) pair already existed.
    pub async fn insert_ingredient(&self, name: &str, measurement_unit: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO ingredients (name, measurement_unit) VALUES (?, ?)",
        )
        .bind(name)
        .bind(measurement_unit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Recipes ────────────────────────────────────────────────────────────

    /// Insert a recipe with its tag and ingredient joins in one transaction.
    pub async fn create_recipe(
        &self,
        author_id: i64,
        name: &str,
        text: &str,
        cooking_time: i64,
        image: &str,
        tag_ids: &[i64],
        ingredient_lines: &[(i64, i64)],
    ) -> Result<RecipeRow> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO recipes (author_id, name, text, cooking_time, image, pub_date)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(author_id)
        .bind(name)
        .bind(text)
        .bind(cooking_time)
        .bind(image)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let recipe_id = result.last_insert_rowid();

        for tag_id in tag_ids {
            sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES (?, ?)")
                .bind(recipe_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
        for (ingredient_id, amount) in ingredient_lines {
            sqlx::query(
                "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES (?, ?, ?)",
            )
            .bind(recipe_id)
            .bind(ingredient_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.get_recipe(recipe_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("recipe not found after insert"))
    }

    /// Update a recipe's fields and replace its tag/ingredient sets wholesale.
    pub async fn update_recipe(
        &self,
        id: i64,
        name: &str,
        text: &str,
        cooking_time: i64,
        image: &str,
        tag_ids: &[i64],
        ingredient_lines: &[(i64, i64)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE recipes SET name = ?, text = ?, cooking_time = ?, image = ? WHERE id = ?")
            .bind(name)
            .bind(text)
            .bind(cooking_time)
            .bind(image)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for tag_id in tag_ids {
            sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
        for (ingredient_id, amount) in ingredient_lines {
            sqlx::query(
                "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(ingredient_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_recipe(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_recipe(&self, id: i64) -> Result<Option<RecipeRow>> {
        Ok(sqlx::query_as("SELECT * FROM recipes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Newest-first filtered page of recipes.
    pub async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RecipeRow>> {
        with_timeout(async {
            let mut qb = QueryBuilder::new("SELECT * FROM recipes WHERE 1=1");
            push_recipe_filters(&mut qb, filter);
            qb.push(" ORDER BY pub_date DESC, id DESC LIMIT ")
                .push_bind(limit)
                .push(" OFFSET ")
                .push_bind(offset);
            Ok(qb.build_query_as::<RecipeRow>().fetch_all(&self.pool).await?)
        })
        .await
    }

    pub async fn count_recipes(&self, filter: &RecipeFilter) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM recipes WHERE 1=1");
        push_recipe_filters(&mut qb, filter);
        Ok(qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn recipe_tags(&self, recipe_id: i64) -> Result<Vec<TagRow>> {
        Ok(sqlx::query_as(
            "SELECT t.* FROM tags t
             JOIN recipe_tags rt ON rt.tag_id = t.id
             WHERE rt.recipe_id = ? ORDER BY t.name ASC",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn recipe_ingredient_lines(&self, recipe_id: i64) -> Result<Vec<IngredientLineRow>> {
        Ok(sqlx::query_as(
            "SELECT i.id, i.name, i.measurement_unit, ri.amount
             FROM recipe_ingredients ri
             JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE ri.recipe_id = ? ORDER BY i.name ASC",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// An author's recipes, newest first, optionally capped (`recipes_limit`).
    pub async fn recipes_by_author(
        &self,
        author_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<RecipeRow>> {
        let rows = match limit {
            Some(n) => {
                sqlx::query_as(
                    "SELECT * FROM recipes WHERE author_id = ?
                     ORDER BY pub_date DESC, id DESC LIMIT ?",
                )
                .bind(author_id)
                .bind(n)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM recipes WHERE author_id = ? ORDER BY pub_date DESC, id DESC",
                )
                .bind(author_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn count_recipes_by_author(&self, author_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = ?")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // ─── Favorites / shopping cart ──────────────────────────────────────────

    pub async fn favorite(&self, user_id: i64, recipe_id: i64) -> Result<bool> {
        self.insert_user_recipe("favorites", user_id, recipe_id).await
    }

    pub async fn unfavorite(&self, user_id: i64, recipe_id: i64) -> Result<bool> {
        self.delete_user_recipe("favorites", user_id, recipe_id).await
    }

    pub async fn is_favorited(&self, user_id: i64, recipe_id: i64) -> Result<bool> {
        self.user_recipe_exists("favorites", user_id, recipe_id).await
    }

    pub async fn cart_add(&self, user_id: i64, recipe_id: i64) -> Result<bool> {
        self.insert_user_recipe("shopping_carts", user_id, recipe_id)
            .await
    }

    pub async fn cart_remove(&self, user_id: i64, recipe_id: i64) -> Result<bool> {
        self.delete_user_recipe("shopping_carts", user_id, recipe_id)
            .await
    }

    pub async fn in_cart(&self, user_id: i64, recipe_id: i64) -> Result<bool> {
        self.user_recipe_exists("shopping_carts", user_id, recipe_id)
            .await
    }

    // The two bookmark relations share one shape; `table` is a compile-time
    // constant at every call site, never user input.
    async fn insert_user_recipe(&self, table: &str, user_id: i64, recipe_id: i64) -> Result<bool> {
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {table} (user_id, recipe_id) VALUES (?, ?)"
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_recipe(&self, table: &str, user_id: i64, recipe_id: i64) -> Result<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE user_id = ? AND recipe_id = ?"
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_recipe_exists(&self, table: &str, user_id: i64, recipe_id: i64) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {table} WHERE user_id = ? AND recipe_id = ?"
        ))
        .bind(user_id)
        .bind(recipe_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Every ingredient line across all recipes in the user's cart,
    /// unaggregated. Summing happens in `shopping::aggregate`.
    pub async fn cart_lines(&self, user_id: i64) -> Result<Vec<CartLineRow>> {
        Ok(sqlx::query_as(
            "SELECT i.name, i.measurement_unit, ri.amount
             FROM shopping_carts sc
             JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
             JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE sc.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn cart_recipe_names(&self, user_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT r.name FROM shopping_carts sc
             JOIN recipes r ON r.id = sc.recipe_id
             WHERE sc.user_id = ? ORDER BY r.name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(n,)| n).collect())
    }

    // ─── Short links ────────────────────────────────────────────────────────

    /// Return the recipe's short code, generating and persisting one on first
    /// use. Codes are 8 hex chars; on the (unlikely) collision the insert is
    /// retried with a fresh code.
    pub async fn ensure_short_code(&self, recipe_id: i64) -> Result<String> {
        if let Some(recipe) = self.get_recipe(recipe_id).await? {
            if let Some(code) = recipe.short_code {
                return Ok(code);
            }
        } else {
            anyhow::bail!("recipe {recipe_id} not found");
        }

        for _ in 0..5 {
            let code = Uuid::new_v4().to_string().replace('-', "")[..8].to_string();
            let result = sqlx::query(
                "UPDATE recipes SET short_code = ? WHERE id = ? AND short_code IS NULL",
            )
            .bind(&code)
            .bind(recipe_id)
            .execute(&self.pool)
            .await;
            match result {
                Ok(_) => {
                    // Re-read: a concurrent caller may have won the race.
                    if let Some(recipe) = self.get_recipe(recipe_id).await? {
                        if let Some(code) = recipe.short_code {
                            return Ok(code);
                        }
                    }
                }
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        anyhow::bail!("could not allocate a unique short code for recipe {recipe_id}")
    }

    pub async fn find_recipe_by_short_code(&self, code: &str) -> Result<Option<RecipeRow>> {
        Ok(sqlx::query_as("SELECT * FROM recipes WHERE short_code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/// Escape LIKE wildcards so a user-supplied prefix matches literally.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (Storage, tempfile::TempDir, i64) {
        let dir = tempfile::tempdir().unwrap();
        let s = Storage::new(dir.path()).await.unwrap();
        let user = s
            .create_user("cook@example.com", "cook", "Ada", "Lovelace", "h")
            .await
            .unwrap();
        s.insert_tag("Breakfast", "breakfast").await.unwrap();
        s.insert_tag("Dinner", "dinner").await.unwrap();
        s.insert_ingredient("flour", "g").await.unwrap();
        s.insert_ingredient("milk", "ml").await.unwrap();
        (s, dir, user.id)
    }

    #[tokio::test]
    async fn recipe_create_read_update_delete() {
        let (s, _d, uid) = seeded().await;
        let r = s
            .create_recipe(uid, "Pancakes", "mix and fry", 20, "recipes/a.png", &[1], &[(1, 300), (2, 200)])
            .await
            .unwrap();
        assert_eq!(r.name, "Pancakes");
        assert_eq!(s.recipe_tags(r.id).await.unwrap().len(), 1);
        let lines = s.recipe_ingredient_lines(r.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, "flour");
        assert_eq!(lines[0].amount, 300);

        s.update_recipe(r.id, "Crepes", "thinner", 15, "recipes/a.png", &[2], &[(2, 500)])
            .await
            .unwrap();
        let updated = s.get_recipe(r.id).await.unwrap().unwrap();
        assert_eq!(updated.name, "Crepes");
        assert_eq!(updated.cooking_time, 15);
        assert_eq!(s.recipe_ingredient_lines(r.id).await.unwrap().len(), 1);
        assert_eq!(s.recipe_tags(r.id).await.unwrap()[0].slug, "dinner");

        s.delete_recipe(r.id).await.unwrap();
        assert!(s.get_recipe(r.id).await.unwrap().is_none());
        // Cascades cleaned the joins.
        assert!(s.recipe_ingredient_lines(r.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_tag_and_author() {
        let (s, _d, uid) = seeded().await;
        let other = s
            .create_user("x@example.com", "x", "X", "Y", "h")
            .await
            .unwrap();
        s.create_recipe(uid, "A", "t", 5, "recipes/a.png", &[1], &[(1, 1)])
            .await
            .unwrap();
        s.create_recipe(other.id, "B", "t", 5, "recipes/b.png", &[2], &[(1, 1)])
            .await
            .unwrap();

        let all = s.list_recipes(&RecipeFilter::default(), 10, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].name, "B");

        let by_author = RecipeFilter {
            author: Some(uid),
            ..Default::default()
        };
        assert_eq!(s.list_recipes(&by_author, 10, 0).await.unwrap().len(), 1);
        assert_eq!(s.count_recipes(&by_author).await.unwrap(), 1);

        let by_tag = RecipeFilter {
            tag_slugs: vec!["dinner".into()],
            ..Default::default()
        };
        let tagged = s.list_recipes(&by_tag, 10, 0).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "B");

        let both_tags = RecipeFilter {
            tag_slugs: vec!["breakfast".into(), "dinner".into()],
            ..Default::default()
        };
        assert_eq!(s.count_recipes(&both_tags).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn favorites_and_cart_filters() {
        let (s, _d, uid) = seeded().await;
        let r = s
            .create_recipe(uid, "A", "t", 5, "recipes/a.png", &[1], &[(1, 1)])
            .await
            .unwrap();
        assert!(s.favorite(uid, r.id).await.unwrap());
        assert!(!s.favorite(uid, r.id).await.unwrap());
        assert!(s.is_favorited(uid, r.id).await.unwrap());

        assert!(s.cart_add(uid, r.id).await.unwrap());
        let filter = RecipeFilter {
            favorited_by: Some(uid),
            in_cart_of: Some(uid),
            ..Default::default()
        };
        assert_eq!(s.count_recipes(&filter).await.unwrap(), 1);

        assert!(s.unfavorite(uid, r.id).await.unwrap());
        assert!(!s.unfavorite(uid, r.id).await.unwrap());
        assert_eq!(s.count_recipes(&filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cart_lines_join_across_recipes() {
        let (s, _d, uid) = seeded().await;
        let a = s
            .create_recipe(uid, "A", "t", 5, "recipes/a.png", &[1], &[(1, 100), (2, 50)])
            .await
            .unwrap();
        let b = s
            .create_recipe(uid, "B", "t", 5, "recipes/b.png", &[1], &[(1, 200)])
            .await
            .unwrap();
        s.cart_add(uid, a.id).await.unwrap();
        s.cart_add(uid, b.id).await.unwrap();

        let lines = s.cart_lines(uid).await.unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(s.cart_recipe_names(uid).await.unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn short_code_is_stable() {
        let (s, _d, uid) = seeded().await;
        let r = s
            .create_recipe(uid, "A", "t", 5, "recipes/a.png", &[1], &[(1, 1)])
            .await
            .unwrap();
        let code = s.ensure_short_code(r.id).await.unwrap();
        assert_eq!(code.len(), 8);
        assert_eq!(s.ensure_short_code(r.id).await.unwrap(), code);
        assert_eq!(
            s.find_recipe_by_short_code(&code).await.unwrap().unwrap().id,
            r.id
        );
        assert!(s.find_recipe_by_short_code("zzzzzzzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ingredient_prefix_filter_is_literal() {
        let (s, _d, _uid) = seeded().await;
        s.insert_ingredient("100% cocoa", "g").await.unwrap();
        let hits = s.list_ingredients(Some("mil")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "milk");
        // '%' must not act as a wildcard
        let hits = s.list_ingredients(Some("100%")).await.unwrap();
        assert_eq!(hits.len(), 1);
        let none = s.list_ingredients(Some("%")).await.unwrap();
        assert!(none.is_empty());
    }
}
