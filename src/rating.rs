use sqlx::SqlitePool;

use crate::error::CoreError;

/// Mean of the given ratings rounded to one decimal, with the count.
/// An empty set yields (0.0, 0).
pub fn aggregate(ratings: &[i64]) -> (f64, i64) {
    if ratings.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = ratings.iter().sum();
    let mean = sum as f64 / ratings.len() as f64;
    ((mean * 10.0).round() / 10.0, ratings.len() as i64)
}

/// Recomputes a salon's rating and review count from its non-deleted
/// reviews. Pure function of the review set, so repeat runs are no-ops.
pub async fn recompute_salon(pool: &SqlitePool, salon_id: &str) -> Result<(f64, i64), CoreError> {
    let ratings = sqlx::query_scalar::<_, i64>(
        "SELECT rating FROM reviews WHERE salon_id = ? AND deleted = 0",
    )
    .bind(salon_id)
    .fetch_all(pool)
    .await?;

    let (rating, count) = aggregate(&ratings);
    sqlx::query("UPDATE salons SET rating = ?, review_count = ? WHERE id = ?")
        .bind(rating)
        .bind(count)
        .bind(salon_id)
        .execute(pool)
        .await?;
    Ok((rating, count))
}

pub async fn recompute_staff(pool: &SqlitePool, staff_id: &str) -> Result<(f64, i64), CoreError> {
    let ratings = sqlx::query_scalar::<_, i64>(
        "SELECT rating FROM reviews WHERE staff_id = ? AND deleted = 0",
    )
    .bind(staff_id)
    .fetch_all(pool)
    .await?;

    let (rating, count) = aggregate(&ratings);
    sqlx::query("UPDATE staff SET rating = ?, review_count = ? WHERE id = ?")
        .bind(rating)
        .bind(count)
        .bind(staff_id)
        .execute(pool)
        .await?;
    Ok((rating, count))
}
