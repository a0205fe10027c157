use serde_json::json;

use super::connect;
use crate::auth::{create_user, list_users, NewUser};
use crate::cli::utils::{format_table, output_success};
use crate::cli::OutputFormat;

pub async fn add(new_user: NewUser, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = connect().await?;
    let user = create_user(&pool, new_user).await?;

    output_success(
        &output_format,
        &format!("User '{}' created with role {}", user.username, user.role),
        Some(json!({ "user": user })),
    )
}

pub async fn list(output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = connect().await?;
    let users = list_users(&pool).await?;

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "users": users }))?),
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = users
                .iter()
                .map(|u| {
                    vec![
                        u.id.to_string(),
                        u.username.clone(),
                        u.role.clone(),
                        if u.active { "yes" } else { "no" }.to_string(),
                        if u.must_change_password { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                format_table(&["id", "username", "role", "active", "must change password"], &rows)
            );
        }
    }
    Ok(())
}
