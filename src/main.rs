//! pcloud CLI - Interact with pCloud storage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use dialoguer::Password;
use glob::glob;

use pcloud_sdk::models::format_size;
use pcloud_sdk::{
    create_detailed_progress, create_minimal_progress, create_progress_bar, create_silent_progress,
    parse_authorization_redirect, AuthType, ClientConfig, Location, PCloudSdk, ProgressCallback,
};

/// CLI tool for interacting with pCloud.
#[derive(Parser)]
#[command(name = "pcloud")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Account email for direct login.
    #[arg(long, global = true, env = "PCLOUD_EMAIL")]
    email: Option<String>,

    /// Account password for direct login (prompted for when omitted).
    #[arg(long, global = true, env = "PCLOUD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Existing access token; skips login and the saved token.
    #[arg(long, global = true, env = "PCLOUD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// How `--token` was obtained.
    #[arg(long, global = true, value_enum, default_value_t = TokenKind::Oauth2, requires = "token")]
    token_type: TokenKind,

    /// OAuth2 client id.
    #[arg(long, global = true, env = "PCLOUD_APP_KEY")]
    app_key: Option<String>,

    /// OAuth2 client secret.
    #[arg(long, global = true, env = "PCLOUD_APP_SECRET", hide_env_values = true)]
    app_secret: Option<String>,

    /// Account region: 1 = US, 2 = EU.
    #[arg(
        long,
        global = true,
        env = "PCLOUD_LOCATION",
        value_parser = clap::value_parser!(u8).range(1..=2)
    )]
    location: Option<u8>,

    /// Credential file.
    #[arg(long, global = true, env = "PCLOUD_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Never read or write the credential file.
    #[arg(long, global = true)]
    no_token_manager: bool,

    /// No progress output.
    #[arg(long, short = 'q', global = true, conflicts_with = "minimal")]
    quiet: bool,

    /// Only print 0/25/50/75/100% milestones.
    #[arg(long, global = true)]
    minimal: bool,

    /// Append every progress update to this CSV file instead of printing.
    #[arg(long, global = true)]
    progress_csv: Option<PathBuf>,

    /// Debug logging and detailed progress.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TokenKind {
    /// Token from `login` (sent as `auth`).
    Direct,
    /// Token from the OAuth2 exchange (sent as `access_token`).
    Oauth2,
}

impl From<TokenKind> for AuthType {
    fn from(kind: TokenKind) -> Self {
        match kind {
            TokenKind::Direct => AuthType::Direct,
            TokenKind::Oauth2 => AuthType::Oauth2,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password, or reuse the saved token.
    Login {
        /// Ignore the saved token.
        #[arg(long)]
        force: bool,
    },

    /// Forget the session and delete the saved token.
    Logout,

    /// Show account and credential information.
    Info,

    /// List a folder.
    List {
        /// Folder ID (defaults to the root).
        #[arg(long, default_value_t = 0)]
        folder_id: u64,
    },

    /// Create a folder.
    Mkdir {
        name: String,

        /// Parent folder ID.
        #[arg(long, default_value_t = 0)]
        parent: u64,
    },

    /// Upload files to a folder.
    Upload {
        /// File patterns to upload (supports glob patterns like *.tar, file_{1,2,3}.txt).
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Destination folder ID.
        #[arg(long, default_value_t = 0)]
        folder_id: u64,

        /// Remote file name (single file only).
        #[arg(long)]
        name: Option<String>,
    },

    /// Download a file to local filesystem.
    Download {
        file_id: u64,

        /// Local destination path (file or directory).
        #[arg(long, short = 't', default_value = ".")]
        to: PathBuf,
    },

    /// Delete a file or a folder.
    #[command(group(ArgGroup::new("target").required(true).args(["file_id", "folder_id"])))]
    Delete {
        #[arg(long)]
        file_id: Option<u64>,

        #[arg(long)]
        folder_id: Option<u64>,

        /// Delete the folder with everything in it.
        #[arg(long, requires = "folder_id")]
        recursive: bool,
    },

    /// Print the OAuth2 authorization URL.
    AuthUrl {
        #[arg(long)]
        redirect_uri: Option<String>,
    },

    /// Finish OAuth2 with the code or the whole redirect URL.
    Authenticate {
        code_or_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli)?;
    let mut sdk = PCloudSdk::new(config)
        .context("Failed to initialize the pCloud client")?;
    if let Some(token) = &cli.token {
        let location = cli.location.map(Location::try_from).transpose()?;
        sdk.set_access_token(token, cli.token_type.into(), location);
    }

    match &cli.command {
        Commands::Login { force } => {
            let password = password_for_login(&cli, *force || !sdk.is_authenticated())?;
            let info = sdk
                .login(cli.email.as_deref(), password.as_deref(), *force)
                .await
                .context("Login failed")?;
            if info.reused {
                println!("Using saved token for {}", info.email);
            } else {
                println!("Logged in as {} ({})", info.email, info.location);
            }
        }

        Commands::Logout => {
            sdk.logout().context("Failed to remove saved credentials")?;
            println!("Logged out.");
        }

        Commands::Info => {
            let creds = sdk.credentials_info();
            println!("Token file:     {}", creds.file);
            let manager = if creds.token_manager_enabled {
                "on"
            } else {
                "off"
            };
            println!("Token manager:  {}", manager);
            if let Some(age) = creds.age_days {
                println!("Token age:      {age:.1} days");
            }

            ensure_login(&mut sdk, &cli).await?;
            let user = sdk
                .user()
                .get_user_info()
                .await
                .context("Failed to fetch account information")?;
            let free = user.quota.saturating_sub(user.usedquota);
            println!("Email:          {}", user.email);
            println!("User ID:        {}", user.userid);
            println!("Premium:        {}", user.premium);
            println!("Quota:          {}", format_size(user.quota));
            println!("Used:           {}", format_size(user.usedquota));
            println!("Free:           {}", format_size(free));
        }

        Commands::List { folder_id } => {
            ensure_login(&mut sdk, &cli).await?;
            let items = sdk
                .folder()
                .get_content(Some(*folder_id), None)
                .await
                .with_context(|| format!("Failed to list folder: {}", folder_id))?;

            if items.is_empty() {
                println!("No files found.");
            } else {
                println!("{:<14} {:<6} {:>10} {}", "ID", "KIND", "SIZE", "NAME");
                println!("{}", "-".repeat(60));
                for item in items {
                    println!("{}", item);
                }
            }
        }

        Commands::Mkdir { name, parent } => {
            ensure_login(&mut sdk, &cli).await?;
            let id = sdk
                .folder()
                .create(name, *parent)
                .await
                .with_context(|| format!("Failed to create folder: {}", name))?;
            println!("Created {} ({})", name, id);
        }

        Commands::Upload {
            patterns,
            folder_id,
            name,
        } => {
            let files_to_upload = expand_patterns(patterns)?;

            if files_to_upload.is_empty() {
                anyhow::bail!("No files to upload");
            }
            if name.is_some() && files_to_upload.len() > 1 {
                anyhow::bail!("--name can only be used with a single file");
            }

            ensure_login(&mut sdk, &cli).await?;
            println!("Uploading {} file(s) to {}...", files_to_upload.len(), folder_id);

            let mut failures = 0;
            for (idx, file_path) in files_to_upload.iter().enumerate() {
                let filename = file_path.file_name().unwrap_or_default().to_string_lossy();
                println!(
                    "[{}/{}] Uploading {}... ",
                    idx + 1,
                    files_to_upload.len(),
                    filename
                );

                let mut tracker = make_tracker(&cli, &filename);
                match sdk
                    .file()
                    .upload(file_path, *folder_id, name.as_deref(), as_callback(&mut tracker))
                    .await
                {
                    Ok(metadata) => {
                        println!("OK ({})", metadata.fileid.unwrap_or_default());
                    }
                    Err(e) => {
                        failures += 1;
                        println!("FAILED");
                        eprintln!("  Error: {}", e);
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} of {} upload(s) failed", failures, files_to_upload.len());
            }
            println!("Done.");
        }

        Commands::Download { file_id, to } => {
            ensure_login(&mut sdk, &cli).await?;
            println!("Downloading {}... ", file_id);

            let mut tracker = make_tracker(&cli, &file_id.to_string());
            let final_path = sdk
                .file()
                .download(*file_id, to, as_callback(&mut tracker))
                .await
                .with_context(|| format!("Failed to download file: {}", file_id))?;

            println!("OK");
            println!("Saved to: {:?}", final_path);
        }

        Commands::Delete {
            file_id,
            folder_id,
            recursive,
        } => {
            ensure_login(&mut sdk, &cli).await?;
            match (file_id, folder_id) {
                (Some(id), _) => {
                    sdk.file()
                        .delete(*id)
                        .await
                        .with_context(|| format!("Failed to delete file: {}", id))?;
                    println!("Deleted file {}", id);
                }
                (None, Some(id)) if *recursive => {
                    let counts = sdk
                        .folder()
                        .delete_recursive(*id)
                        .await
                        .with_context(|| format!("Failed to delete folder: {}", id))?;
                    println!(
                        "Deleted folder {} ({} files, {} folders)",
                        id, counts.deletedfiles, counts.deletedfolders
                    );
                }
                (None, Some(id)) => {
                    sdk.folder()
                        .delete(*id)
                        .await
                        .with_context(|| format!("Failed to delete folder: {}", id))?;
                    println!("Deleted folder {}", id);
                }
                (None, None) => anyhow::bail!("--file-id or --folder-id is required"),
            }
        }

        Commands::AuthUrl { redirect_uri } => {
            let url = sdk
                .get_auth_url(redirect_uri.as_deref())
                .context("Cannot build the authorization URL")?;
            println!("Open this URL and approve access:");
            println!("{}", url);
        }

        Commands::Authenticate { code_or_url } => {
            let auth = parse_authorization_redirect(code_or_url)
                .with_context(|| format!("Invalid authorization code or URL: {}", code_or_url))?;
            let info = sdk
                .authenticate(&auth.code, auth.location)
                .await
                .context("Authorization code exchange failed")?;
            println!("Authenticated as {} ({})", info.email, info.location);
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::default()
        .with_token_manager(!cli.no_token_manager);
    if let Some(id) = cli.location {
        config = config.with_location(Location::try_from(id)?);
    }
    if let Some(path) = &cli.token_file {
        config = config.with_token_file(path);
    }
    config = config.with_app_credentials(
        cli.app_key.clone().unwrap_or_default(),
        cli.app_secret.clone().unwrap_or_default(),
    );
    Ok(config)
}

/// Log in when no session was restored and an email was given.
async fn ensure_login(sdk: &mut PCloudSdk, cli: &Cli) -> Result<()> {
    if sdk.is_authenticated() {
        return Ok(());
    }
    if cli.email.is_none() {
        anyhow::bail!("Not logged in; run `pcloud login --email <EMAIL>` first");
    }
    let password = password_for_login(cli, true)?;
    sdk.login(cli.email.as_deref(), password.as_deref(), false)
        .await
        .context("Login failed")?;
    Ok(())
}

/// The `--password` value, or one typed at a hidden prompt when a direct
/// login is about to happen with only an email.
fn password_for_login(cli: &Cli, needs_login: bool) -> Result<Option<String>> {
    let Some(email) = cli.email.as_deref() else {
        return Ok(cli.password.clone());
    };
    if cli.password.is_some() || !needs_login {
        return Ok(cli.password.clone());
    }

    let password = Password::new()
        .with_prompt(format!("pCloud password for {email}"))
        .interact()
        .context("Failed to read the password")?;
    if password.is_empty() {
        anyhow::bail!("A password is required");
    }
    Ok(Some(password))
}

fn make_tracker(cli: &Cli, title: &str) -> Option<Box<dyn ProgressCallback>> {
    if let Some(path) = &cli.progress_csv {
        return Some(Box::new(create_silent_progress(path)));
    }
    if cli.quiet {
        None
    } else if cli.minimal {
        Some(Box::new(create_minimal_progress()))
    } else if cli.verbose {
        Some(Box::new(create_detailed_progress(None)))
    } else {
        Some(Box::new(create_progress_bar(title)))
    }
}

fn as_callback(
    tracker: &mut Option<Box<dyn ProgressCallback>>,
) -> Option<&mut dyn ProgressCallback> {
    match tracker {
        Some(tracker) => Some(&mut **tracker),
        None => None,
    }
}

/// Expand glob and brace patterns into existing files, sorted and deduplicated.
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        // Handle brace expansion manually for patterns like file_{1,2,3}.txt
        for expanded_pattern in expand_braces(pattern) {
            let matches: Vec<PathBuf> = glob(&expanded_pattern)
                .with_context(|| format!("Invalid glob pattern: {}", expanded_pattern))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file())
                .collect();

            if matches.is_empty() {
                // If no glob matches, treat as literal path
                let path = PathBuf::from(&expanded_pattern);
                if path.is_file() {
                    files.push(path);
                } else {
                    eprintln!("Warning: No files matched pattern: {}", expanded_pattern);
                }
            } else {
                files.extend(matches);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand brace patterns like file_{1,2,3}.txt into multiple patterns.
fn expand_braces(pattern: &str) -> Vec<String> {
    if let Some(start) = pattern.find('{') {
        if let Some(end) = pattern[start..].find('}') {
            let end = start + end;
            let prefix = &pattern[..start];
            let suffix = &pattern[end + 1..];
            let alternatives = &pattern[start + 1..end];

            return alternatives
                .split(',')
                .flat_map(|alt| {
                    let expanded = format!("{}{}{}", prefix, alt.trim(), suffix);
                    expand_braces(&expanded)
                })
                .collect();
        }
    }

    vec![pattern.to_string()]
}
