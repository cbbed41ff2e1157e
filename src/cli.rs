//! Command-line interface parsing for tablesync
//!
//! Global flags override the environment configuration; each subcommand maps
//! to one repository, proxy or sync operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::Config;
use crate::data::RestaurantFilter;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The rating is not a number from 1 to 5
    #[error("Invalid rating: '{0}'. Ratings are whole numbers from 1 to 5")]
    InvalidRating(String),
}

/// tablesync - offline-first restaurant directory client
#[derive(Parser, Debug)]
#[command(name = "tablesync")]
#[command(about = "Offline-first restaurant directory with queued review sync")]
#[command(version)]
pub struct Cli {
    /// Base URL of the restaurant API
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Origin of the static site whose requests are cached
    #[arg(long, global = true, value_name = "URL")]
    pub origin: Option<String>,

    /// Directory for the local store and resource cache
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Cache the app shell into the static bucket
    Install,
    /// Delete cache buckets left over from previous versions
    Activate,
    /// Resolve a URL through the cache and print the body
    Fetch {
        /// Absolute URL, or a path relative to the origin
        url: String,
    },
    /// List restaurants, optionally filtered
    Restaurants {
        /// Cuisine to show, or "all"
        #[arg(long)]
        cuisine: Option<String>,
        /// Neighborhood to show, or "all"
        #[arg(long)]
        neighborhood: Option<String>,
    },
    /// Replace the local restaurant and review snapshots from the API
    Refresh,
    /// List neighborhoods
    Neighborhoods,
    /// List cuisines
    Cuisines,
    /// Show a restaurant with its reviews
    Show {
        id: u32,
    },
    /// Mark a restaurant as a favorite
    Favorite {
        id: u32,
    },
    /// Remove a restaurant from favorites
    Unfavorite {
        id: u32,
    },
    /// Queue a review for a restaurant and try to sync it
    Review {
        /// Restaurant id
        id: u32,
        #[arg(long)]
        name: String,
        /// Rating from 1 to 5
        #[arg(long, value_parser = parse_rating_arg)]
        rating: u8,
        #[arg(long)]
        comments: String,
    },
    /// List reviews waiting to be synced
    Pending,
    /// Upload queued reviews now
    Sync,
    /// Keep syncing queued reviews until interrupted
    Watch,
}

/// Parses a rating argument.
///
/// # Arguments
/// * `s` - The rating string from CLI
///
/// # Returns
/// * `Ok(u8)` for a whole number from 1 to 5
/// * `Err(CliError::InvalidRating)` otherwise
pub fn parse_rating_arg(s: &str) -> Result<u8, CliError> {
    s.trim()
        .parse::<u8>()
        .ok()
        .filter(|rating| (1..=5).contains(rating))
        .ok_or_else(|| CliError::InvalidRating(s.to_string()))
}

impl Cli {
    /// Overrides `config` with any global flags that were given
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(url) = &self.api_url {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(origin) = &self.origin {
            config.origin = origin.trim_end_matches('/').to_string();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
    }
}

impl Command {
    /// Restaurant filter for the `restaurants` subcommand
    pub fn filter(&self) -> RestaurantFilter {
        match self {
            Command::Restaurants {
                cuisine,
                neighborhood,
            } => RestaurantFilter::new(cuisine.as_deref(), neighborhood.as_deref()),
            _ => RestaurantFilter::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rating_arg_valid() {
        assert_eq!(parse_rating_arg("1").unwrap(), 1);
        assert_eq!(parse_rating_arg("5").unwrap(), 5);
        assert_eq!(parse_rating_arg(" 3 ").unwrap(), 3);
    }

    #[test]
    fn test_parse_rating_arg_out_of_range() {
        assert!(parse_rating_arg("0").is_err());
        assert!(parse_rating_arg("6").is_err());
        assert!(parse_rating_arg("300").is_err());
    }

    #[test]
    fn test_parse_rating_arg_invalid() {
        let result = parse_rating_arg("great");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid rating"));
        assert!(err.to_string().contains("great"));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["tablesync"]).is_err());
    }

    #[test]
    fn test_cli_parse_pending() {
        let cli = Cli::parse_from(["tablesync", "pending"]);
        assert_eq!(cli.command, Command::Pending);
        assert_eq!(cli.verbose, 0);
        assert!(cli.api_url.is_none());
    }

    #[test]
    fn test_cli_parse_refresh() {
        let cli = Cli::parse_from(["tablesync", "refresh"]);
        assert_eq!(cli.command, Command::Refresh);
    }

    #[test]
    fn test_cli_parse_review() {
        let cli = Cli::parse_from([
            "tablesync",
            "review",
            "3",
            "--name",
            "Ann",
            "--rating",
            "4",
            "--comments",
            "Lovely dumplings",
        ]);
        assert_eq!(
            cli.command,
            Command::Review {
                id: 3,
                name: "Ann".to_string(),
                rating: 4,
                comments: "Lovely dumplings".to_string(),
            }
        );
    }

    #[test]
    fn test_cli_rejects_bad_rating() {
        let result = Cli::try_parse_from([
            "tablesync", "review", "3", "--name", "Ann", "--rating", "9", "--comments", "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "tablesync",
            "sync",
            "--api-url",
            "http://127.0.0.1:9/",
            "-vv",
        ]);
        assert_eq!(cli.command, Command::Sync);
        assert_eq!(cli.api_url.as_deref(), Some("http://127.0.0.1:9/"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_apply_to_overrides_config() {
        let cli = Cli::parse_from([
            "tablesync",
            "--api-url",
            "http://api.test/",
            "--data-dir",
            "/tmp/ts",
            "install",
        ]);
        let mut config = Config::default();

        cli.apply_to(&mut config);

        assert_eq!(config.api_base_url, "http://api.test");
        assert_eq!(config.origin, crate::config::DEFAULT_ORIGIN);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/ts")));
    }

    #[test]
    fn test_restaurants_filter() {
        let cli = Cli::parse_from(["tablesync", "restaurants", "--cuisine", "Pizza"]);
        let filter = cli.command.filter();
        assert_eq!(filter.cuisine.as_deref(), Some("Pizza"));
        assert!(filter.neighborhood.is_none());

        let cli = Cli::parse_from(["tablesync", "restaurants", "--neighborhood", "all"]);
        assert_eq!(cli.command.filter(), RestaurantFilter::default());
    }
}
