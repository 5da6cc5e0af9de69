/// Address book persistence
use anyhow::{anyhow, Result};
use sqlx::SqlitePool;

use crate::db::now_epoch;
use crate::models::address::{Address, AddressStatus, NewAddress};

const SELECT_ADDRESS: &str =
    "SELECT id, name, email, status, created_at, updated_at FROM addresses";

/// Checks the fields a row cannot be stored without.
pub fn validate(new: &NewAddress) -> Result<(), String> {
    if new.name.trim().is_empty() {
        return Err("name is required".into());
    }
    if new.email.trim().is_empty() {
        return Err("email is required".into());
    }
    if new.email.trim().parse::<lettre::Address>().is_err() {
        return Err(format!("email is not a valid address: {}", new.email));
    }
    Ok(())
}

/// All addresses, optionally narrowed to one status.
pub async fn list(pool: &SqlitePool, status: Option<AddressStatus>) -> Result<Vec<Address>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, Address>(&format!("{SELECT_ADDRESS} WHERE status = ? ORDER BY id"))
                .bind(status)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as::<_, Address>(&format!("{SELECT_ADDRESS} ORDER BY id"))
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Address>> {
    list(pool, Some(AddressStatus::Active)).await
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Address>> {
    let row = sqlx::query_as::<_, Address>(&format!("{SELECT_ADDRESS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Looks an address up by email, ignoring case. The oldest entry wins when
/// the book holds duplicates.
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Address>> {
    let row = sqlx::query_as::<_, Address>(&format!(
        "{SELECT_ADDRESS} WHERE lower(email) = lower(?) ORDER BY id LIMIT 1"
    ))
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn create(pool: &SqlitePool, new: NewAddress) -> Result<Address> {
    validate(&new).map_err(|e| anyhow!(e))?;
    let now = now_epoch();
    let status = new.status.unwrap_or_default();
    let result = sqlx::query(
        "INSERT INTO addresses (name, email, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new.name.trim())
    .bind(new.email.trim())
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!(email = %new.email, status = status.as_str(), "address created");
    Ok(Address {
        id: result.last_insert_rowid(),
        name: new.name.trim().to_string(),
        email: new.email.trim().to_string(),
        status,
        created_at: now,
        updated_at: now,
    })
}

/// Replaces name, email and status. `None` when the id is unknown.
pub async fn update(pool: &SqlitePool, id: i64, new: NewAddress) -> Result<Option<Address>> {
    validate(&new).map_err(|e| anyhow!(e))?;
    let now = now_epoch();
    let status = new.status.unwrap_or_default();
    let result = sqlx::query(
        "UPDATE addresses SET name = ?, email = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(new.name.trim())
    .bind(new.email.trim())
    .bind(status)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM addresses WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
