use sqlx::PgPool;

/// Single read the second system of record exposes to this service. The API
/// service owns its schema (Prisma naming), hence the quoted table.
pub async fn fetch_profile_emails(db: &PgPool) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(r#"SELECT email FROM "Profile""#)
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(|(email,)| email).collect())
}
