use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use whereabouts::config::EngineConfig;
use whereabouts::location::collaborators::Position;
use whereabouts::location::LocationResolver;

/// Whereabouts: time-bounded city/region detection
///
/// Works out where the user is from a cached answer, their saved profile,
/// a device fix, or IP geolocation, and reports whether listings exist there.
///
/// Examples:
///   whereabouts locate
///   whereabouts locate --redetect
///   whereabouts --lat -27.59 --lon -48.55 locate
///   whereabouts set Curitiba "Paraná"
///   whereabouts serve --port 8080
#[derive(Parser)]
#[command(name = "whereabouts", version, about, long_about = None)]
struct Cli {
    /// JSON config file.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Location cache file. Defaults to ~/.whereabouts/location.json.
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Device latitude (-90 to 90).
    #[arg(long, allow_hyphen_values = true, global = true)]
    lat: Option<f64>,

    /// Device longitude (-180 to 180).
    #[arg(long, allow_hyphen_values = true, global = true)]
    lon: Option<f64>,

    /// Debug logging.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the current location and print it as JSON.
    Locate {
        /// Ignore the cache and detect from scratch.
        #[arg(long)]
        redetect: bool,
    },
    /// Pin the location to a city and region.
    Set { city: String, region: String },
    /// Forget the stored location.
    Clear,
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, short = 'p', default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli);
    let resolver = LocationResolver::from_config(&config);

    match cli.command {
        Command::Locate { redetect } => {
            // Subscribed before anything runs so an early listing count is not missed.
            let mut availability = resolver.subscribe_availability();
            if redetect {
                resolver.redetect();
            } else {
                resolver.start();
            }
            let state = resolver.wait_until_loaded().await;

            // Give the listing check a moment when there is a backend to ask.
            if state.resolved.is_some() && config.backend.is_some() {
                let _ = tokio::time::timeout(config.http_timeout(), availability.changed()).await;
            }

            match &state.resolved {
                Some(location) => eprintln!("  {}", location.display_line()),
                None => eprintln!(
                    "  Location unknown: {}",
                    state.error.map(|e| e.to_string()).unwrap_or_default()
                ),
            }
            print_json(&resolver.view());
            resolver.shutdown();
        }
        Command::Set { city, region } => {
            let location = resolver.set_manual_location(&city, &region).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                process::exit(1);
            });
            eprintln!("  {}", location.display_line());
            print_json(&resolver.view());
        }
        Command::Clear => {
            resolver.clear_location();
            eprintln!("  Location cleared.");
        }
        Command::Serve { host, port } => {
            if let Err(e) = whereabouts::server::start(&host, port, resolver).await {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "whereabouts=debug" } else { "whereabouts=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> EngineConfig {
    let mut config = EngineConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    if let Some(path) = &cli.cache {
        config.cache_path = Some(path.clone());
    }

    match (cli.lat, cli.lon) {
        (Some(latitude), Some(longitude)) => {
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                eprintln!("Error: Invalid coordinates. Lat: -90..90, Lon: -180..180");
                process::exit(1);
            }
            config.position = Some(Position {
                latitude,
                longitude,
            });
        }
        (None, None) => {}
        _ => {
            eprintln!("Error: --lat and --lon must be given together.");
            process::exit(1);
        }
    }

    config
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
