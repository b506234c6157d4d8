use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use crate::api::{self, Classification, FetchError};
use crate::config;
use crate::data::{self, CategoryService, ImageService};
use crate::logging;
use crate::ui;
use crate::viewer::{Category, Selection, Viewer};

#[derive(Debug, Clone, Parser, Default)]
#[command(
    name = "picroll",
    version,
    about = "picroll - Roll random images by category from the terminal."
)]
pub struct Args {
    /// Config file to read instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Initial classification (sfw or nsfw)
    #[arg(long, value_name = "CLASS")]
    pub classification: Option<Classification>,

    /// Initial category, or "all" for a random one
    #[arg(long, value_name = "NAME")]
    pub category: Option<String>,

    /// Fetch a single image link, print it and exit
    #[arg(long)]
    pub once: bool,

    /// Use built-in sample categories and generated pictures
    #[arg(long)]
    pub demo: bool,
}

struct Services {
    categories: Arc<dyn CategoryService>,
    images: Arc<dyn ImageService>,
}

pub fn run(args: Args) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: args.config.clone(),
        ..Default::default()
    })
    .context("load config")?;
    logging::init(&cfg.log).context("init logging")?;
    tracing::info!(version = crate::VERSION, "starting picroll");

    let selection = Selection {
        classification: args.classification.unwrap_or(cfg.ui.classification),
        category: Category::parse(args.category.as_deref().unwrap_or(&cfg.ui.category)),
    };
    let services = build_services(&cfg, args.demo)?;

    if args.once {
        return fetch_once(&services, selection);
    }

    let config_path = args.config.clone().or_else(config::default_path);
    let options = ui::Options {
        status_message: format!(
            "Starting up. Config: {}",
            friendly_path(config_path.as_ref())
        ),
        category_service: services.categories,
        image_service: services.images,
        selection,
        fade: cfg.ui.fade,
        auto_fetch: cfg.ui.auto_fetch,
    };

    let mut model = ui::Model::new(options);
    model.run()?;
    tracing::info!("picroll exited");
    Ok(())
}

fn build_services(cfg: &config::Config, demo: bool) -> Result<Services> {
    if demo {
        return Ok(Services {
            categories: Arc::new(data::MockCategoryService),
            images: Arc::new(data::MockImageService),
        });
    }

    let client = api::Client::new(api::ClientConfig {
        categories_base: cfg.api.categories_base.clone(),
        images_base: cfg.api.images_base.clone(),
        user_agent: cfg.api.user_agent.clone(),
        timeout: Some(cfg.api.timeout),
        http_client: None,
    })
    .context("create api client")?;
    let client = Arc::new(client);

    Ok(Services {
        categories: Arc::new(data::HttpCategoryService::new(client.clone())),
        images: Arc::new(data::HttpImageService::new(client)),
    })
}

/// Runs one category load and one image lookup without the TUI.
fn fetch_once(services: &Services, selection: Selection) -> Result<()> {
    let mut viewer = Viewer::new(selection);
    if let Some(notice) = viewer.apply_categories(services.categories.load_categories()) {
        eprintln!("{notice}");
    }

    let ticket = match viewer.begin_fetch(&mut rand::thread_rng()) {
        Ok(ticket) => ticket,
        Err(FetchError::CategoriesUnavailable) => {
            bail!("no categories available: the category list could not be loaded")
        }
        Err(err) => return Err(anyhow!(err)),
    };
    let result = services
        .images
        .random_image(ticket.classification, &ticket.category);
    viewer.complete_fetch(ticket.seq, result);

    match viewer.result().url() {
        Some(url) => {
            println!("{url}");
            Ok(())
        }
        None => match viewer.result().error() {
            Some(err) => Err(anyhow!(err.clone())).context("fetch image"),
            None => Err(anyhow!("no image returned")),
        },
    }
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/picroll/config.yaml".to_string()
    }
}
