//! Prints the numeric user id for every login given on the command line.

use anyhow::Context;
use twitch_eventsub::{OAuthClient, UsersClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let logins: Vec<String> = std::env::args()
        .skip(1)
        .map(|login| login.trim_start_matches('#').to_lowercase())
        .collect();
    if logins.is_empty() {
        anyhow::bail!("usage: user-ids <login> [<login>...]");
    }

    let client_id = dotenv::var("TWITCH_CLIENT_ID").context("TWITCH_CLIENT_ID is not set")?;
    let client_secret =
        dotenv::var("TWITCH_CLIENT_SECRET").context("TWITCH_CLIENT_SECRET is not set")?;

    let oauth = OAuthClient::new(client_id.clone(), client_secret, String::new());
    let token = oauth.app_access_token().await?;

    let logins: Vec<&str> = logins.iter().map(String::as_str).collect();
    let users = UsersClient::new(reqwest::Client::new(), client_id, token)
        .by_logins(&logins)
        .await?;

    for user in &users {
        println!("User: {} - ID: {}", user.login, user.id);
    }
    for login in logins.iter().filter(|l| !users.iter().any(|u| u.login == **l)) {
        eprintln!("User: {login} - not found");
    }

    Ok(())
}
