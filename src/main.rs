//! tablesync - offline-first restaurant directory client
//!
//! Browses a restaurant API through a local snapshot, caches the static site
//! for offline use, and queues reviews until they can be uploaded.

use clap::Parser;
use std::io::Write;
use std::sync::Arc;

use tablesync::app::DirectoryState;
use tablesync::cache::{resolve_url, CacheStorage, CachingProxy, HttpFetcher, ResourceRequest};
use tablesync::cli::{Cli, Command};
use tablesync::config::Config;
use tablesync::data::{HttpRestaurantApi, NewReview, Restaurant, RestaurantApi, Review, ReviewRepository};
use tablesync::logging;
use tablesync::store::{FileStore, KeyValueStore};
use tablesync::sync::{
    DrainOutcome, DrainReport, SyncConfig, SyncCoordinator, SyncHandle, SyncMessage,
    SyncRegistrar,
};

fn print_restaurant_line(restaurant: &Restaurant) {
    println!(
        "{:>4}  {}{}  ({}, {})",
        restaurant.id,
        restaurant.name,
        if restaurant.is_favorite { " *" } else { "" },
        restaurant.neighborhood,
        restaurant.cuisine_type
    );
}

fn print_review(review: &Review) {
    let date = review
        .created_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());
    let status = if review.is_pending() { " [pending]" } else { "" };
    println!("  {} - {}/5 - {}{}", review.name, review.rating, date, status);
    println!("    {}", review.comments);
}

fn print_report(report: &DrainReport) {
    println!(
        "Synced {} of {} queued reviews; {} still pending",
        report.succeeded, report.attempted, report.remaining
    );
}

fn build_proxy(config: &Config, client: reqwest::Client) -> Result<CachingProxy, Box<dyn std::error::Error>> {
    let storage = CacheStorage::with_dir(config.cache_dir()?);
    Ok(CachingProxy::new(
        storage,
        Arc::new(HttpFetcher::with_client(client)),
        config.proxy_settings(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::from_env()?;
    cli.apply_to(&mut config);

    let client = config.http_client()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::with_dir(config.store_dir()?));
    let api: Arc<dyn RestaurantApi> = Arc::new(HttpRestaurantApi::with_client(
        client.clone(),
        config.api_base_url.clone(),
    ));
    let (registrar, mut events) = SyncRegistrar::channel();
    let repository = ReviewRepository::new(store.clone(), api.clone(), registrar);
    let coordinator = Arc::new(SyncCoordinator::new(store, api));

    match cli.command.clone() {
        Command::Install => {
            let proxy = build_proxy(&config, client)?;
            let report = proxy.install().await?;
            println!(
                "Cached {} resources into {}",
                report.cached.len(),
                proxy.settings().static_bucket
            );
            for (url, reason) in &report.failed {
                println!("  failed: {} ({})", url, reason);
            }
        }
        Command::Activate => {
            let proxy = build_proxy(&config, client)?;
            let removed = proxy.activate().await?;
            if removed.is_empty() {
                println!("No stale caches");
            }
            for name in removed {
                println!("Deleted {}", name);
            }
        }
        Command::Fetch { url } => {
            let proxy = build_proxy(&config, client)?;
            let url = if url.starts_with("http://") || url.starts_with("https://") {
                url
            } else {
                resolve_url(&config.origin, &url)
            };
            let resource = proxy.handle(&ResourceRequest::get(url)).await?;
            proxy.flush().await;
            let mut stdout = std::io::stdout();
            stdout.write_all(&resource.body)?;
            stdout.flush()?;
        }
        Command::Restaurants { .. } => {
            let restaurants = repository
                .fetch_restaurants_by_cuisine_and_neighborhood(&cli.command.filter())
                .await?;
            if restaurants.is_empty() {
                println!("No restaurants match");
            }
            for restaurant in &restaurants {
                print_restaurant_line(restaurant);
            }
        }
        Command::Refresh => {
            let restaurants = repository.refresh_restaurants().await?;
            let reviews = repository.refresh_reviews().await?;
            println!(
                "Refreshed {} restaurants and {} reviews",
                restaurants.len(),
                reviews.len()
            );
        }
        Command::Neighborhoods => {
            for neighborhood in repository.fetch_neighborhoods().await? {
                println!("{}", neighborhood);
            }
        }
        Command::Cuisines => {
            for cuisine in repository.fetch_cuisines().await? {
                println!("{}", cuisine);
            }
        }
        Command::Show { id } => {
            let mut state = DirectoryState::new(repository);
            state.load().await?;
            let restaurant = state.open_restaurant(id).await?.clone();

            print_restaurant_line(&restaurant);
            if !restaurant.address.is_empty() {
                println!("      {}", restaurant.address);
            }
            for (day, hours) in &restaurant.operating_hours {
                println!("      {:<10} {}", day, hours);
            }
            match state.average_rating() {
                Some(average) => println!("Rating {:.1}/5 from {} reviews", average, state.reviews.len()),
                None => println!("No reviews yet"),
            }
            if state.reviews_offline {
                println!("(offline: showing reviews queued on this device only)");
            }
            for review in &state.reviews {
                print_review(review);
            }
        }
        Command::Favorite { id } | Command::Unfavorite { id } => {
            let value = matches!(cli.command, Command::Favorite { .. });
            let update = repository.mark_favorite(id, value).await?;
            let verb = if value { "Marked" } else { "Unmarked" };
            println!("{} {} as favorite", verb, update.restaurant.name);
            if !update.confirmed {
                println!("(saved locally; the server was not updated)");
            }
        }
        Command::Review {
            id,
            name,
            rating,
            comments,
        } => {
            let entry = repository
                .queue_review_for_sync(NewReview::new(id, name, rating, comments))
                .await?;
            println!("Review queued ({})", entry.token);

            while let Ok(event) = events.try_recv() {
                if let Some(DrainOutcome::Completed(report)) = coordinator.on_sync(&event).await? {
                    print_report(&report);
                }
            }
        }
        Command::Pending => {
            let pending = repository.pending_reviews().await?;
            if pending.is_empty() {
                println!("No reviews waiting for sync");
            }
            for entry in &pending {
                println!("{}  restaurant {}", entry.token, entry.review.restaurant_id);
                print_review(&entry.review);
            }
        }
        Command::Sync => match coordinator.drain().await? {
            DrainOutcome::Completed(report) => print_report(&report),
            DrainOutcome::AlreadyDraining => println!("A sync is already running"),
        },
        Command::Watch => {
            let sync_config = SyncConfig {
                retry_interval: config.sync_retry_interval,
            };
            let mut handle = SyncHandle::spawn(coordinator, events, sync_config);
            println!("Watching for queued reviews; press Ctrl-C to stop");

            loop {
                tokio::select! {
                    message = handle.receiver.recv() => match message {
                        Some(SyncMessage::Drained(report)) => print_report(&report),
                        Some(SyncMessage::Skipped) => {}
                        Some(SyncMessage::Failed(reason)) => eprintln!("Sync failed: {}", reason),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            handle.shutdown().await;
        }
    }

    Ok(())
}
