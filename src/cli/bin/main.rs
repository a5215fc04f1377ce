#[macro_use]
extern crate clap;
#[macro_use]
extern crate prettytable;

use std::env;

use anyhow::{anyhow, Context, Result};
use clap::{App, Arg, ArgMatches};
use dotenv::dotenv;
use prettytable::Table;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use exlog::User;

/// Every endpoint answers either with its payload or with `{"error": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply<T> {
    Failed { error: String },
    Done(T),
}

#[derive(Debug, Deserialize)]
struct ExerciseEcho {
    username: String,
    description: String,
    duration: i64,
    date: String,
}

#[derive(Debug, Deserialize)]
struct LogView {
    username: String,
    count: usize,
    log: Vec<EntryView>,
}

#[derive(Debug, Deserialize)]
struct EntryView {
    description: String,
    duration: i64,
    date: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let base_url: String = env::var("BASE_URL").context("BASE_URL env var must be set!")?;

    let client = Client::new();

    let matches = App::new("exlog")
        .version(crate_version!())
        .author("Samuel Vanderwaal")
        .about("Command line client for the exercise log service.")
        .arg(
            Arg::with_name("add_user")
                .short("a")
                .long("add-user")
                .takes_value(true)
                .value_name("username")
                .help("Register a new user."),
        )
        .arg(
            Arg::with_name("users")
                .short("u")
                .long("users")
                .help("List all users."),
        )
        .arg(
            Arg::with_name("exercise")
                .short("e")
                .long("exercise")
                .value_names(&["user_id", "description", "duration"])
                .help("Add an exercise to a user's log."),
        )
        .arg(
            Arg::with_name("date")
                .short("d")
                .long("date")
                .takes_value(true)
                .help("Use with '-e'. Date of the exercise, defaults to today."),
        )
        .arg(
            Arg::with_name("log")
                .short("l")
                .long("log")
                .takes_value(true)
                .value_name("user_id")
                .help("Print a user's exercise log."),
        )
        .arg(
            Arg::with_name("from")
                .long("from")
                .takes_value(true)
                .help("Use with '-l'. Earliest date to include."),
        )
        .arg(
            Arg::with_name("to")
                .long("to")
                .takes_value(true)
                .help("Use with '-l'. Latest date to include."),
        )
        .arg(
            Arg::with_name("limit")
                .long("limit")
                .takes_value(true)
                .help("Use with '-l'. Maximum number of entries."),
        )
        .get_matches();

    if let Err(e) = dispatch(&base_url, &client, &matches).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn dispatch(base_url: &str, client: &Client, matches: &ArgMatches<'_>) -> Result<()> {
    if let Some(username) = matches.value_of("add_user") {
        let url = format!("{}/api/users", base_url);
        let res = client
            .post(&url)
            .form(&[("username", username)])
            .send()
            .await?;
        let user: User = unwrap_reply(res).await?;
        println!("Created user {} with id {}", user.username, user.id);
    }

    if matches.is_present("users") {
        let url = format!("{}/api/users", base_url);
        let users: Vec<User> = unwrap_reply(client.get(&url).send().await?).await?;

        let mut table = Table::new();
        table.add_row(row![Fb => "Id", "Username"]);
        for user in users {
            table.add_row(row![user.id, user.username]);
        }
        table.printstd();
    }

    if let Some(values) = matches.values_of("exercise") {
        let values: Vec<&str> = values.collect();
        let (user_id, description, duration) = match values.as_slice() {
            [user_id, description, duration] => (*user_id, *description, *duration),
            _ => return Err(anyhow!("--exercise takes a user id, a description and a duration")),
        };

        let mut form = vec![("description", description), ("duration", duration)];
        if let Some(date) = matches.value_of("date") {
            form.push(("date", date));
        }

        let url = format!("{}/api/users/{}/exercises", base_url, user_id);
        let res = client.post(&url).form(&form).send().await?;
        let echo: ExerciseEcho = unwrap_reply(res).await?;
        println!(
            "Logged {} ({}) for {} on {}",
            echo.description, echo.duration, echo.username, echo.date
        );
    }

    if let Some(user_id) = matches.value_of("log") {
        let query: Vec<(&str, &str)> = ["from", "to", "limit"]
            .iter()
            .filter_map(|key| matches.value_of(key).map(|value| (*key, value)))
            .collect();

        let url = format!("{}/api/users/{}/logs", base_url, user_id);
        let res = client.get(&url).query(&query).send().await?;
        let view: LogView = unwrap_reply(res).await?;

        println!("{}: {} entries", view.username, view.count);
        let mut table = Table::new();
        table.add_row(row![Fb => "Date", "Description", "Duration"]);
        for entry in view.log {
            table.add_row(row![entry.date, entry.description, entry.duration]);
        }
        table.printstd();
    }

    Ok(())
}

async fn unwrap_reply<T: DeserializeOwned>(res: reqwest::Response) -> Result<T> {
    let status = res.status();
    match res.json::<Reply<T>>().await {
        Ok(Reply::Done(body)) => Ok(body),
        Ok(Reply::Failed { error }) => Err(anyhow!("{} ({})", error, status)),
        Err(e) => Err(anyhow!("Unexpected response ({}): {}", status, e)),
    }
}
