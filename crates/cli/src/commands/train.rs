//! `train` subcommand

use anyhow::{bail, Context as _, Result};
use clap::Args;
use rgbd_common::Criteria;
use rgbd_orchestrator::Classifier;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct TrainCommand {
    /// Dataset root containing one folder per object (e.g. `02/`, `05/`)
    #[arg(long)]
    dataset: PathBuf,

    /// Output directory for the trained state
    #[arg(long, default_value = "trained")]
    output: PathBuf,

    /// Restrict training to these template view ids
    #[arg(long, value_delimiter = ',')]
    indices: Option<Vec<u32>>,

    /// Random seed for triplet generation and feature-point selection
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Object folder names under the dataset root; all folders when empty
    objects: Vec<String>,
}

impl TrainCommand {
    pub fn execute(self) -> Result<()> {
        let roots = self.object_roots()?;
        if roots.is_empty() {
            bail!("no object folders found under {}", self.dataset.display());
        }
        info!(objects = roots.len(), "training started");

        let criteria = Criteria {
            seed: self.seed,
            ..Criteria::default()
        };
        let mut classifier = Classifier::new(criteria);
        classifier
            .train(&roots, &self.output, self.indices.as_deref())
            .context("training failed")?;

        println!(
            "Trained {} templates into {}",
            classifier.store().len(),
            self.output.display()
        );
        Ok(())
    }

    fn object_roots(&self) -> Result<Vec<PathBuf>> {
        if !self.objects.is_empty() {
            return Ok(self
                .objects
                .iter()
                .map(|name| self.dataset.join(name))
                .collect());
        }

        let mut roots = Vec::new();
        for entry in std::fs::read_dir(&self.dataset)
            .with_context(|| format!("cannot read {}", self.dataset.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                roots.push(entry.path());
            }
        }
        roots.sort();
        Ok(roots)
    }
}
