use anyhow::bail;
use clap::Parser;
use tracing::debug;

pub mod config;
pub mod store;

use podium_client_core::auth::SessionStore;
use podium_client_core::event::{Recommendation, ResultSet};
use podium_client_core::pager::ResultPager;
use podium_client_core::session::SessionPhase;
use podium_stream_client::{SessionController, StreamClientConfig, SubmitError};

use config::{CliConfig, EnvGeoProvider};
use store::FileSessionStore;

#[derive(Parser)]
#[command(name = "podium")]
#[command(about = "Streamed restaurant recommendations, three at a time")]
pub struct PodiumCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Log in and persist the session token
    Login(LoginArgs),
    /// Ask for recommendations and browse the podium
    Ask(AskArgs),
    /// Show the persisted login, if any
    Whoami,
    /// Forget the persisted session
    Logout,
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Account email
    #[arg(long)]
    pub email: String,
    /// Account password
    #[arg(long)]
    pub password: String,
}

#[derive(clap::Args)]
pub struct AskArgs {
    /// What you are craving
    pub input: String,
    /// Print every recommendation at once instead of browsing
    #[arg(long)]
    pub all: bool,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = PodiumCli::parse();
    let config = CliConfig::from_env()?;
    match cli.command {
        Commands::Login(args) => run_login(&config, args).await,
        Commands::Ask(args) => run_ask(&config, args).await,
        Commands::Whoami => run_whoami(&config),
        Commands::Logout => run_logout(&config),
    }
}

type CliController = SessionController<FileSessionStore, EnvGeoProvider>;

fn controller_for(config: &CliConfig) -> anyhow::Result<CliController> {
    let stream_config = StreamClientConfig::new(&config.base_url)?;
    let store = FileSessionStore::new(config.session_file.clone());
    let geo = EnvGeoProvider::new(config.location);
    Ok(SessionController::new(stream_config, store, geo)?)
}

async fn run_login(config: &CliConfig, args: LoginArgs) -> anyhow::Result<()> {
    let controller = controller_for(config)?;
    let session = controller
        .login_and_persist(&args.email, &args.password)
        .await?;
    println!("logged in as {}", session.email);
    println!("session stored at {}", config.session_file.display());
    Ok(())
}

async fn run_ask(config: &CliConfig, args: AskArgs) -> anyhow::Result<()> {
    let mut controller = controller_for(config)?;

    let mut last_progress = String::new();
    let submitted = controller
        .submit(&args.input, |snapshot| {
            let progress = snapshot.progress();
            if !progress.is_empty() && progress != last_progress {
                println!("... {progress}");
                last_progress = progress.to_string();
            }
        })
        .await;

    let outcome = match submitted {
        Ok(phase) => phase,
        Err(SubmitError::NotAuthenticated) => bail!("not logged in; run `podium login` first"),
        Err(SubmitError::NotAdmitted) => bail!("nothing to ask"),
        Err(SubmitError::Store { message }) => bail!("session store failed: {message}"),
    };

    if outcome != SessionPhase::Complete {
        let message = controller
            .state()
            .error_message()
            .unwrap_or("request failed")
            .to_string();
        bail!(message);
    }

    let retries = controller.last_retry_count();
    if retries > 0 {
        debug!(retries, "stream reconnected before completing");
    }

    let Some(pager) = controller.pager_mut() else {
        bail!("stream ended without results");
    };

    if args.all {
        print_all(pager.results());
        return Ok(());
    }
    browse(pager)
}

fn run_whoami(config: &CliConfig) -> anyhow::Result<()> {
    let store = FileSessionStore::new(config.session_file.clone());
    match store.load_session().map_err(anyhow::Error::msg)? {
        Some(session) => {
            println!("logged in as {}", session.email);
            if let Some(logged_in_at) = session.logged_in_at {
                println!("since {}", logged_in_at.to_rfc3339());
            }
            println!("backend {} ({})", config.base_url, config.base_url_source);
        }
        None => println!("not logged in"),
    }
    Ok(())
}

fn run_logout(config: &CliConfig) -> anyhow::Result<()> {
    let store = FileSessionStore::new(config.session_file.clone());
    store.clear_session().map_err(anyhow::Error::msg)?;
    println!("logged out");
    Ok(())
}

const NO_RESULTS_NOTICE: &str = "no recommendations";

fn browse(pager: &mut ResultPager) -> anyhow::Result<()> {
    if pager.results().is_empty() {
        println!("{NO_RESULTS_NOTICE}");
        return Ok(());
    }
    let stdin = std::io::stdin();
    loop {
        print_window(pager);
        println!("(enter/n for the next three, a key for details, q to quit)");

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            return Ok(());
        }
        match line.trim() {
            "" | "n" => pager.advance(),
            "q" => return Ok(()),
            key => {
                match pager.select(key) {
                    Ok(recommendation) => {
                        print_detail(recommendation);
                        println!("(enter to go back)");
                        let mut pause = String::new();
                        stdin.read_line(&mut pause)?;
                    }
                    Err(error) => println!("{error}"),
                }
                pager.clear_selection();
            }
        }
    }
}

fn print_window(pager: &ResultPager) {
    println!();
    for line in window_lines(pager) {
        println!("{line}");
    }
}

fn print_all(results: &ResultSet) {
    if results.is_empty() {
        println!("{NO_RESULTS_NOTICE}");
        return;
    }
    println!();
    for (key, recommendation) in results.entries() {
        println!("{}", row_line(key, recommendation));
    }
}

/// Header plus one row per windowed entry; an empty set yields only the
/// notice, never a header.
fn window_lines(pager: &ResultPager) -> Vec<String> {
    let total = pager.results().len();
    if total == 0 {
        return vec![NO_RESULTS_NOTICE.to_string()];
    }
    let start = pager.start_index();
    let shown = pager.window().len();
    let mut lines = vec![format!("podium {}-{} of {total}", start + 1, start + shown)];
    for (key, recommendation) in pager.window() {
        lines.push(row_line(key, recommendation));
    }
    lines
}

fn row_line(key: &str, recommendation: &Recommendation) -> String {
    let mut line = format!(
        "  [{key}] {}  {:.1}",
        recommendation.name, recommendation.rating
    );
    if !recommendation.delivery.is_empty() {
        line.push_str("  ");
        line.push_str(&recommendation.delivery);
    }
    line
}

fn print_detail(recommendation: &Recommendation) {
    println!();
    println!("{}", recommendation.name);
    println!("  rating   {:.1}", recommendation.rating);
    if !recommendation.delivery.is_empty() {
        println!("  delivery {}", recommendation.delivery);
    }
    if !recommendation.maps_uri.is_empty() {
        println!("  maps     {}", recommendation.maps_uri);
    }
    if !recommendation.photo_url.is_empty() {
        println!("  photo    {}", recommendation.photo_url);
    }
}
