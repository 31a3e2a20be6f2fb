use anyhow::Context;
use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::auth;
use crate::database::manager::DatabaseManager;
use crate::database::provisioner::Provisioner;

#[derive(Args)]
pub struct InitArgs {
    /// Bootstrap (or reset the password of) a central admin account
    #[arg(long, requires = "admin_password")]
    pub admin_email: Option<String>,

    #[arg(long, requires = "admin_email")]
    pub admin_password: Option<String>,
}

/// Create the central registry database if needed, run its migrations, and
/// optionally bootstrap a central admin.
pub async fn run(args: InitArgs, json_output: bool) -> anyhow::Result<()> {
    let admin_pool = DatabaseManager::admin_pool()
        .await
        .context("connecting to the postgres maintenance database")?;

    let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pg_database WHERE datname = $1")
        .bind(DatabaseManager::CENTRAL_DB_NAME)
        .fetch_one(&admin_pool)
        .await?;

    let created = if exists.0 == 0 {
        sqlx::query(&format!(
            "CREATE DATABASE {}",
            DatabaseManager::quote_identifier(DatabaseManager::CENTRAL_DB_NAME)
        ))
        .execute(&admin_pool)
        .await?;
        true
    } else {
        false
    };

    let central_pool = DatabaseManager::central_pool()
        .await
        .context("connecting to the central registry database")?;
    Provisioner::migrate_central(&central_pool)
        .await
        .context("running central migrations")?;

    let mut admin_bootstrapped = false;
    if let (Some(email), Some(password)) = (&args.admin_email, &args.admin_password) {
        let password_hash = auth::hash_password(password)?;
        sqlx::query(
            r#"
            INSERT INTO admins (id, email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, 'Central', 'Admin')
            ON CONFLICT (email)
            DO UPDATE SET password_hash = EXCLUDED.password_hash, updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(&password_hash)
        .execute(&central_pool)
        .await?;
        admin_bootstrapped = true;
    }

    if json_output {
        println!(
            "{}",
            json!({
                "database": DatabaseManager::CENTRAL_DB_NAME,
                "created": created,
                "migrated": true,
                "admin_bootstrapped": admin_bootstrapped,
            })
        );
    } else {
        if created {
            println!("Created central database {}", DatabaseManager::CENTRAL_DB_NAME);
        }
        println!("Central migrations applied");
        if admin_bootstrapped {
            println!("Central admin account ready");
        }
    }

    Ok(())
}
