//! Account commands: login, logout, whoami, quota and passwd.

use anyhow::{Context, Result};

use cloudbox_core::dialogs::{self, PasswordChange};

use super::{open_session, LoginArgs, OutputArgs};
use crate::ui;

/// Run the login command.
pub async fn login(args: LoginArgs, server: Option<&str>) -> Result<()> {
    let (_, session) = open_session(server)?;

    let password = match args.password {
        Some(password) => password,
        None => ui::prompt("Password")?,
    };

    let user = session
        .api()
        .login(&args.username, &password, args.remember)
        .await?;

    println!();
    println!("  Logged in as {}", user.username);
    if !args.remember {
        println!("  The login is kept for this session only; use --remember to stay logged in.");
    }
    println!();
    Ok(())
}

/// Run the logout command.
pub async fn logout(server: Option<&str>) -> Result<()> {
    let (_, mut session) = open_session(server)?;
    session.logout().await?;
    println!("  Logged out.");
    Ok(())
}

/// Run the whoami command.
pub async fn whoami(args: &OutputArgs, server: Option<&str>) -> Result<()> {
    let (_, session) = open_session(server)?;
    let user = session.api().me().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }

    println!();
    println!("  User:   {}", user.username);
    if let Some(name) = &user.full_name {
        println!("  Name:   {}", name);
    }
    if let Some(email) = &user.email {
        println!("  Email:  {}", email);
    }
    if user.is_admin {
        println!("  Role:   administrator");
    }
    println!();
    Ok(())
}

/// Run the quota command.
pub async fn quota(args: &OutputArgs, server: Option<&str>) -> Result<()> {
    let (_, mut session) = open_session(server)?;
    let info = *session.refresh_quota().await?;

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "used_storage": info.used_storage,
                "total_storage": info.total_storage,
                "percentage": info.percentage(),
            })
        );
    } else {
        println!("  {}", ui::quota_line(&info));
    }
    Ok(())
}

/// Run the passwd command.
pub async fn passwd(server: Option<&str>) -> Result<()> {
    let (_, session) = open_session(server)?;

    let form = PasswordChange {
        current: ui::prompt("Current password")?,
        new: ui::prompt("New password")?,
        confirm: ui::prompt("Repeat new password")?,
    };

    dialogs::change_password(session.api(), &form)
        .await
        .context("Password not changed")?;

    println!();
    println!("  Password changed. Log in again with the new password.");
    println!();
    Ok(())
}
