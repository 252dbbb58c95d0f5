use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymmaster::cache::ClassBoard;
use gymmaster::config::Config;
use gymmaster::dashboard;
use gymmaster::services::{AttendanceMark, AvailableClassesQuery};
use gymmaster::{
    AppError, AttemptOutcome, CheckInError, FileStorage, GymClient, LoginOutcome, Notice, Phase, ScanResult,
};
use shared::{ClassStatus, ProfileUpdate, Role};

#[derive(Parser)]
#[command(name = "gymmaster")]
#[command(about = "GymMaster client - classes, reservations and QR check-in from the terminal")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides config)
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Log in, answering a second-factor challenge if the server asks for one
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Log out and forget the stored session
    Logout,
    /// Show current login status
    Whoami,
    /// Renew the session token
    Refresh,
    /// Change the account password
    ChangePassword,
    /// Request a password reset email
    ForgotPassword { email: String },
    /// Show the dashboard for the logged-in role
    Dashboard,
    /// List classes
    Classes {
        /// Only classes I have reserved
        #[arg(long, conflicts_with = "trainer")]
        mine: bool,
        /// Classes I teach (trainers)
        #[arg(long)]
        trainer: bool,
        #[arg(long)]
        branch: Option<String>,
        /// Day to list (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Reserve a spot in a class
    Reserve { class_id: String },
    /// Cancel a class reservation
    Cancel { class_id: String },
    /// Record attendance for a reservation (trainers)
    Attendance {
        reservation_id: String,
        #[arg(value_enum)]
        status: AttendanceArg,
    },
    /// Change a class status (trainers)
    ClassStatus {
        class_id: String,
        #[arg(value_enum)]
        status: ClassStatusArg,
    },
    /// List branches
    Branches,
    /// Show or update the member profile
    Profile {
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        emergency_contact: Option<String>,
        #[arg(long)]
        emergency_phone: Option<String>,
    },
    /// Check in by scanning a branch QR code; further scans are read from stdin
    Checkin { payload: Option<String> },
    /// List my check-ins
    Checkins {
        /// Only the open check-in
        #[arg(long)]
        active: bool,
    },
    /// Close an open check-in
    Checkout {
        check_in_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Check that the backend is reachable
    Ping,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (base_url, timeout_secs)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Show all configuration
    Show,
    /// Get the config file path
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
enum AttendanceArg {
    Completed,
    NoShow,
}

impl From<AttendanceArg> for AttendanceMark {
    fn from(arg: AttendanceArg) -> Self {
        match arg {
            AttendanceArg::Completed => AttendanceMark::Completed,
            AttendanceArg::NoShow => AttendanceMark::NoShow,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassStatusArg {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl From<ClassStatusArg> for ClassStatus {
    fn from(arg: ClassStatusArg) -> Self {
        match arg {
            ClassStatusArg::Scheduled => ClassStatus::Scheduled,
            ClassStatusArg::InProgress => ClassStatus::InProgress,
            ClassStatusArg::Completed => ClassStatus::Completed,
            ClassStatusArg::Cancelled => ClassStatus::Cancelled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymmaster=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::Config { action } = cli.command {
        return handle_config_command(action);
    }

    let config = Config::load().unwrap_or_default();
    let storage = Arc::new(FileStorage::in_data_dir()?);
    let client = GymClient::new(&config.client_config(cli.server), storage)?;

    if let Err(e) = run(&client, cli.command).await {
        report(&e);
        std::process::exit(1);
    }
    Ok(())
}

/// Render a failure the same way for every command
fn report(err: &AppError) {
    let notice = Notice::from(err);
    print_notice(&notice);
}

fn print_notice(notice: &Notice) {
    if notice.silent {
        eprintln!("\x1b[33m🔐 {}\x1b[0m", notice.message);
        eprintln!("   Run '\x1b[1mgymmaster login\x1b[0m' to authenticate.");
        return;
    }
    eprintln!("\x1b[31m✗ {}:\x1b[0m {}", notice.title, notice.message);
    if notice.retry {
        eprintln!("\x1b[90mYou can try again.\x1b[0m");
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn input_error(e: io::Error) -> AppError {
    AppError::Validation(format!("Could not read input: {}", e))
}

fn require_login(client: &GymClient) -> Result<(), AppError> {
    if client.session().phase() != Phase::Authenticated {
        return Err(AppError::SessionExpired);
    }
    Ok(())
}

async fn run(client: &GymClient, command: Commands) -> Result<(), AppError> {
    match command {
        // Handled before the client is built
        Commands::Config { .. } => {}
        Commands::Login { email, password } => login(client, email, password).await?,
        Commands::Logout => {
            client.auth().logout();
            println!("\x1b[32m✅ Logged out successfully\x1b[0m");
        }
        Commands::Whoami => match client.session().user() {
            Some(user) => {
                println!("\x1b[32m✓ Logged in\x1b[0m");
                println!("Name:  {}", user.full_name);
                println!("Email: {}", user.email);
                println!("Role:  {:?}", user.role);
                match user.qr_identity_at(Utc::now()) {
                    Some(qr) => println!("QR:    valid until {}", qr.qr_code_expiry.with_timezone(&Local)),
                    None => println!("QR:    none"),
                }
            }
            None => {
                println!("\x1b[33m✗ Not logged in\x1b[0m");
                println!("Run '\x1b[1mgymmaster login\x1b[0m' to authenticate");
            }
        },
        Commands::Refresh => {
            let user = client.auth().refresh_session().await?;
            println!("\x1b[32m✅ Session renewed for {}\x1b[0m", user.email);
        }
        Commands::ChangePassword => {
            require_login(client)?;
            let current = prompt("Current password").map_err(input_error)?;
            let new = prompt("New password").map_err(input_error)?;
            let message = client.auth().change_password(&current, &new).await?;
            println!("\x1b[32m✅ {}\x1b[0m", message);
        }
        Commands::ForgotPassword { email } => {
            let message = client.auth().forgot_password(&email).await?;
            println!("{}", message);
        }
        Commands::Dashboard => show_dashboard(client).await?,
        Commands::Classes {
            mine,
            trainer,
            branch,
            date,
        } => {
            require_login(client)?;
            if trainer {
                let summary = dashboard::load_trainer_dashboard(&client.classes(), date).await?;
                print_trainer_classes(&summary);
            } else {
                let list = if mine {
                    client.classes().my_classes().await?
                } else {
                    let query = AvailableClassesQuery {
                        branch_id: branch,
                        date,
                    };
                    client.classes().available(&query).await?
                };
                let mut board = ClassBoard::new();
                board.reconcile(list);
                print_board(&board);
            }
        }
        Commands::Reserve { class_id } => {
            require_login(client)?;
            let mut board = ClassBoard::new();
            board.reconcile(client.classes().get(&class_id).await.into_iter().collect());
            client.classes().reserve(&class_id).await?;
            board.apply_reserved(&class_id);
            println!("\x1b[32m✅ Reserved\x1b[0m");
            if !board.entries().is_empty() {
                print_board(&board);
            }
        }
        Commands::Cancel { class_id } => {
            require_login(client)?;
            let mut board = ClassBoard::new();
            board.reconcile(client.classes().get(&class_id).await.into_iter().collect());
            client.classes().cancel(&class_id).await?;
            board.apply_cancelled(&class_id);
            println!("\x1b[32m✅ Reservation cancelled\x1b[0m");
            if !board.entries().is_empty() {
                print_board(&board);
            }
        }
        Commands::Attendance {
            reservation_id,
            status,
        } => {
            require_login(client)?;
            client
                .classes()
                .mark_attendance(&reservation_id, status.into())
                .await?;
            println!("\x1b[32m✅ Attendance recorded\x1b[0m");
        }
        Commands::ClassStatus { class_id, status } => {
            require_login(client)?;
            client.classes().update_status(&class_id, status.into()).await?;
            println!("\x1b[32m✅ Class updated\x1b[0m");
        }
        Commands::Branches => {
            require_login(client)?;
            for branch in client.branches().list().await? {
                let state = if branch.is_active { "" } else { " (closed)" };
                println!(
                    "{}  {} - {}, {}  {}-{}{}",
                    branch.id,
                    branch.name,
                    branch.address,
                    branch.city,
                    branch.opening_time,
                    branch.closing_time,
                    state
                );
            }
        }
        Commands::Profile {
            phone,
            emergency_contact,
            emergency_phone,
        } => {
            require_login(client)?;
            let update = ProfileUpdate {
                phone,
                emergency_contact,
                emergency_phone,
            };
            let profile = if update.is_empty() {
                client.members().profile().await?
            } else {
                client.members().update_profile(&update).await?
            };
            println!("Membership: {}", profile.membership_number);
            println!("Phone:      {}", profile.phone.unwrap_or_default());
            println!(
                "Emergency:  {} {}",
                profile.emergency_contact.unwrap_or_default(),
                profile.emergency_phone.unwrap_or_default()
            );
        }
        Commands::Checkin { payload } => check_in(client, payload).await?,
        Commands::Checkins { active } => {
            require_login(client)?;
            let list = if active {
                client.checkins().active().await?.into_iter().collect()
            } else {
                client.checkins().mine().await?
            };
            if list.is_empty() {
                println!("No check-ins");
            }
            for c in list {
                let out = c
                    .check_out_time
                    .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
                    .unwrap_or_else(|| "open".to_string());
                println!(
                    "{}  {}  {} -> {}",
                    c.id,
                    c.branch.name,
                    c.check_in_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    out
                );
            }
        }
        Commands::Checkout { check_in_id, notes } => {
            require_login(client)?;
            client.checkins().checkout(&check_in_id, notes).await?;
            println!("\x1b[32m✅ Checked out\x1b[0m");
        }
        Commands::Ping => {
            client.api().health().await?;
            println!("\x1b[32m✓ {} is reachable\x1b[0m", client.api().base_url());
        }
    }
    Ok(())
}

async fn login(client: &GymClient, email: Option<String>, password: Option<String>) -> Result<(), AppError> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email").map_err(input_error)?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt("Password").map_err(input_error)?,
    };

    let auth = client.auth();
    match auth.login(&email, &password).await? {
        LoginOutcome::Authenticated(user) => {
            println!("\x1b[1;32m✅ Login successful!\x1b[0m");
            println!("\x1b[90mWelcome, {}\x1b[0m", user.full_name);
        }
        LoginOutcome::Rejected(reason) => {
            print_notice(&Notice {
                title: "Login failed",
                message: reason,
                retry: true,
                silent: false,
            });
        }
        LoginOutcome::NeedsSecondFactor => {
            println!("\x1b[1;36m🔐 Enter the 6-digit code sent to you\x1b[0m");
            loop {
                let code = prompt("Code").map_err(input_error)?;
                if code.is_empty() {
                    auth.logout();
                    println!("Login cancelled");
                    break;
                }
                match auth.verify_second_factor(&code).await {
                    Ok(true) => {
                        println!("\x1b[1;32m✅ Login successful!\x1b[0m");
                        break;
                    }
                    Ok(false) => println!("\x1b[33mInvalid code, try again (empty line to cancel)\x1b[0m"),
                    Err(e @ AppError::Validation(_)) => report(&e),
                    Err(e) => return Err(e),
                }
            }
        }
    }
    Ok(())
}

async fn show_dashboard(client: &GymClient) -> Result<(), AppError> {
    let user = client.session().user().ok_or(AppError::SessionExpired)?;
    match user.role {
        Role::Trainer => {
            let today = Local::now().date_naive();
            let summary = dashboard::load_trainer_dashboard(&client.classes(), Some(today)).await?;
            println!("\x1b[1m{}\x1b[0m - trainer", user.full_name);
            println!("Upcoming: {}  Held today: {}", summary.upcoming, summary.completed_today);
            print_trainer_classes(&summary);
        }
        _ => {
            let dash = client.member_dashboard().await;
            println!("\x1b[1m{}\x1b[0m", user.full_name);
            match &dash.stats {
                Ok(stats) => {
                    println!("Check-ins this month: {}", stats.total_checkins_this_month);
                    println!("Enrolled classes:     {}", stats.total_enrolled_classes);
                    if let Some(end) = stats.membership_end_date {
                        println!("Membership until:     {}", end.with_timezone(&Local).format("%Y-%m-%d"));
                    }
                }
                Err(e) => report(e),
            }
            println!("Upcoming classes:     {}", dash.upcoming(Utc::now()));
            match dash.classes {
                Ok(list) => {
                    let mut board = ClassBoard::new();
                    board.reconcile(list.into_iter().take(3).collect());
                    print_board(&board);
                }
                Err(e) => report(&e),
            }
        }
    }
    Ok(())
}

async fn check_in(client: &GymClient, first: Option<String>) -> Result<(), AppError> {
    let flow = client.check_in_flow();
    let mut next = first;

    loop {
        let payload = match next.take() {
            Some(p) => p,
            None => prompt("Scan").map_err(input_error)?,
        };

        let attempt = match flow.on_scan(&payload).await {
            ScanResult::Completed(attempt) => attempt,
            ScanResult::Ignored => continue,
        };

        match attempt.outcome {
            AttemptOutcome::Succeeded {
                check_in_id,
                checked_in_at,
                branch_name,
            } => {
                println!("\x1b[1;32m✅ Check-in successful!\x1b[0m");
                println!("Branch: {}", branch_name);
                println!("Time:   {}", checked_in_at.with_timezone(&Local).format("%H:%M:%S"));
                println!("\x1b[90mCheck-in id: {}\x1b[0m", check_in_id);
                flow.close();
                return Ok(());
            }
            AttemptOutcome::Failed(err) => {
                print_notice(&Notice::from(&err));
                if !flow.retry() {
                    flow.close();
                    if err == CheckInError::SessionExpired {
                        return Err(AppError::SessionExpired);
                    }
                    return Ok(());
                }
                let answer = prompt("Retry? [Y/n]").map_err(input_error)?;
                if answer.eq_ignore_ascii_case("n") {
                    flow.close();
                    return Ok(());
                }
            }
            AttemptOutcome::Pending => {}
        }
    }
}

fn print_board(board: &ClassBoard) {
    if board.entries().is_empty() {
        println!("No classes");
    }
    for entry in board.entries() {
        let class = &entry.class;
        let marker = if entry.is_provisional() { "*" } else { "" };
        println!(
            "{}  {}  {}  {}  {}  {}/{}{}",
            class.id,
            class.start_time.with_timezone(&Local).format("%a %d %b %H:%M"),
            class.name,
            class.instructor,
            class.branch_name,
            entry.attendees(),
            class.capacity,
            marker
        );
    }
}

fn print_trainer_classes(summary: &dashboard::TrainerDashboard) {
    if summary.classes.is_empty() {
        println!("No classes");
    }
    for tc in &summary.classes {
        let class = &tc.class;
        println!(
            "{}  {}  {}  {}/{}",
            class.id,
            class.start_time.with_timezone(&Local).format("%a %d %b %H:%M"),
            class.name,
            class.current_attendees,
            class.capacity
        );
        for r in &tc.reservations {
            println!("    {}  {}  {:?}", r.id, r.member_name, r.status);
        }
    }
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let mut config = Config::load().unwrap_or_default();
            match key.as_str() {
                "base_url" => config.api.base_url = Some(value),
                "timeout_secs" => config.api.timeout_secs = value.parse()?,
                _ => anyhow::bail!("Unknown config key: {}. Valid keys: base_url, timeout_secs", key),
            }
            config.save()?;
            println!("Configuration saved");
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = match key.as_str() {
                "base_url" => config.client_config(None).base_url,
                "timeout_secs" => config.api.timeout_secs.to_string(),
                _ => anyhow::bail!("Unknown config key: {}", key),
            };
            println!("{}", value);
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("base_url: {}", config.client_config(None).base_url);
            println!("timeout_secs: {}", config.api.timeout_secs);
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
