//! `detect` subcommand

use anyhow::{Context as _, Result};
use clap::Args;
use rgbd_common::Criteria;
use rgbd_orchestrator::{discover_scene_indices, Classifier};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct DetectCommand {
    /// Directory with the trained state (templates and classifier.json)
    #[arg(long)]
    trained: PathBuf,

    /// Scene directory containing `rgb/`, `depth/` and `info.yml`
    #[arg(long)]
    scenes: PathBuf,

    /// Write the result stream to this JSON file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pyramid levels below the original scale
    #[arg(long)]
    levels_down: Option<usize>,

    /// Pyramid levels above the original scale
    #[arg(long)]
    levels_up: Option<usize>,

    /// Scale factor between neighbouring pyramid levels
    #[arg(long)]
    scale_factor: Option<f32>,

    /// Scene indices to process; every scene on disk when empty
    scene_indices: Vec<u32>,
}

impl DetectCommand {
    pub fn execute(self) -> Result<()> {
        let mut classifier = Classifier::new(Criteria::default());

        let trained_list = self.trained_object_files()?;
        classifier
            .load(&trained_list, &self.trained)
            .context("loading trained state failed")?;

        // Pyramid shape may be overridden per run; the trained statistics
        // stay as persisted
        let criteria = classifier.criteria_mut();
        if let Some(down) = self.levels_down {
            criteria.pyramid_levels_down = down;
        }
        if let Some(up) = self.levels_up {
            criteria.pyramid_levels_up = up;
        }
        if let Some(factor) = self.scale_factor {
            criteria.pyramid_scale_factor = factor;
        }

        let indices = if self.scene_indices.is_empty() {
            discover_scene_indices(&self.scenes)?
        } else {
            self.scene_indices.clone()
        };
        info!(scenes = indices.len(), "detection started");

        let results = classifier
            .detect(&self.scenes, &indices)
            .context("detection failed")?;

        let json = serde_json::to_string_pretty(&results)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("cannot write {}", path.display()))?;
                println!("Results written to {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }

    /// Per-object template files in the trained directory
    fn trained_object_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.trained)
            .with_context(|| format!("cannot read {}", self.trained.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let is_object_file = path.extension().is_some_and(|e| e == "json")
                && path.file_name().is_some_and(|n| n != "classifier.json");
            if is_object_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
