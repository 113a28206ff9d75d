use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "trombino", about = "Trombino face recognition CLI")]
struct Cli {
    /// Base URL of the trombinod daemon
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "TROMBINO_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from one or more face images
    Enroll {
        /// Name of the person to enroll
        #[arg(short, long)]
        name: String,
        /// Image files (several for a multi-pose enrollment)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Identify the person in an image
    Identify {
        image: PathBuf,
    },
    /// Check whether two images show the same person
    Verify {
        image1: PathBuf,
        image2: PathBuf,
    },
    /// Estimate age, gender, emotion and ethnicity for a face
    Analyze {
        image: PathBuf,
    },
    /// List enrolled people
    People,
    /// List stored enrollment records
    Records,
    /// Remove every record for a person
    Remove {
        /// Name of the person to remove
        name: String,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Enroll { name, images } => {
            let mut form = reqwest::multipart::Form::new().text("name", name);
            let endpoint = if images.len() > 1 {
                for image in &images {
                    form = form.part("files", file_part(image)?);
                }
                "register-multi"
            } else {
                form = form.part("file", file_part(&images[0])?);
                "register"
            };
            let response = client
                .post(format!("{base}/api/{endpoint}"))
                .multipart(form)
                .send()
                .await?;
            print_response(response).await
        }
        Commands::Identify { image } => {
            let form = reqwest::multipart::Form::new().part("file", file_part(&image)?);
            let response = client.post(format!("{base}/api/identify")).multipart(form).send().await?;
            print_response(response).await
        }
        Commands::Verify { image1, image2 } => {
            let form = reqwest::multipart::Form::new()
                .part("file1", file_part(&image1)?)
                .part("file2", file_part(&image2)?);
            let response = client.post(format!("{base}/api/verify")).multipart(form).send().await?;
            print_response(response).await
        }
        Commands::Analyze { image } => {
            let form = reqwest::multipart::Form::new().part("file", file_part(&image)?);
            let response = client.post(format!("{base}/api/analyze")).multipart(form).send().await?;
            print_response(response).await
        }
        Commands::People => {
            print_response(client.get(format!("{base}/api/people")).send().await?).await
        }
        Commands::Records => {
            print_response(client.get(format!("{base}/api/records")).send().await?).await
        }
        Commands::Remove { name } => {
            print_response(client.delete(format!("{base}/api/people/{name}")).send().await?).await
        }
        Commands::Status => print_response(client.get(format!("{base}/")).send().await?).await,
    }
}

fn file_part(path: &Path) -> Result<reqwest::multipart::Part> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(reqwest::multipart::Part::bytes(bytes).file_name(filename))
}

async fn print_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let text = response.text().await?;
    let pretty = serde_json::from_str::<serde_json::Value>(&text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or(text);
    println!("{pretty}");

    if !status.is_success() {
        bail!("daemon answered {status}");
    }
    Ok(())
}
