use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, error, info, warn};

use crate::analysis::{DuplicateWriteAnalyzer, EfficiencyAnalyzer};
use crate::application::RuntimeConfig;
use crate::application::output::{diff_summary, layer_table, metrics_summary};
use crate::ci::{Evaluator, RuleConfigError};
use crate::comparer::{Comparer, ComparerError};
use crate::config::{AnalysisConfig, AnalysisConfigError};
use crate::ext::AsyncTryInto;
use crate::filesystem::{RenderStyle, StackEngine};
use crate::image::{ImageManifest, ManifestError};

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();

        let mut config = AnalysisConfig::read(app_config.config.as_deref(), &app_config.manifest_dir())
            .await
            .context(ConfigSnafu)?;
        app_config.overrides.apply(&mut config.rules);
        debug!("Loaded config: {:?}", config);

        let manifest: ImageManifest = app_config
            .manifest
            .as_path()
            .async_try_into()
            .await
            .context(ManifestSnafu)?;
        info!("Loaded {} layers", manifest.layers.len());

        let comparer = Comparer::new(manifest.trees(), StackEngine::new(config.missing_target));
        let errors = comparer.build_cache().context(ComparerSnafu)?;
        if !errors.is_empty() {
            for structural_error in errors {
                error!("{}", structural_error);
            }
            if !(app_config.ignore_errors || config.ignore_errors) {
                return StructuralErrorsSnafu {
                    count: errors.len(),
                }
                .fail();
            }
            warn!("Ignoring {} structural errors, results may be inaccurate", errors.len());
        }

        if app_config.ci {
            Self::run_ci(&app_config, &config, &comparer)
        } else {
            Self::explore(&app_config, &manifest, &comparer)
        }
    }

    fn run_ci(
        app_config: &RuntimeConfig,
        config: &AnalysisConfig,
        comparer: &Comparer,
    ) -> Result<(), ApplicationError> {
        let evaluator = Evaluator::from_thresholds(&config.rules).context(RuleConfigSnafu)?;
        let metrics = DuplicateWriteAnalyzer
            .analyze(comparer)
            .context(ComparerSnafu)?;

        print!("{}", metrics_summary(&metrics));
        let evaluation = evaluator.evaluate(&metrics);
        print!("{}", evaluation.report(app_config.colorize));

        ensure!(
            evaluation.passed(),
            CiFailedSnafu {
                failed: evaluation.tally().failed
            }
        );
        Ok(())
    }

    fn explore(
        app_config: &RuntimeConfig,
        manifest: &ImageManifest,
        comparer: &Comparer,
    ) -> Result<(), ApplicationError> {
        if comparer.layer_count() == 0 {
            warn!("Image has no layers");
            return Ok(());
        }
        let index = app_config.layer.unwrap_or(comparer.layer_count() - 1);
        let tree = comparer
            .tree_for(app_config.mode, index)
            .context(ComparerSnafu)?;
        let diff = comparer
            .diff_for(app_config.mode, index)
            .context(ComparerSnafu)?;

        let style = RenderStyle {
            colorize: app_config.colorize,
            attributes: app_config.attributes,
            ..RenderStyle::default()
        };
        print!("{}", layer_table(manifest, index));
        println!();
        print!("{}", diff_summary(index, app_config.mode, diff));
        print!("{}", tree.render_styled(&style));
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while reading the analysis config"))]
    ConfigError { source: AnalysisConfigError },
    #[snafu(display("Critical failure encountered while reading the image manifest"))]
    ManifestError { source: ManifestError },
    #[snafu(display("Critical failure encountered while comparing layers"))]
    ComparerError { source: ComparerError },
    #[snafu(display(
        "Image contains {count} structural errors, rerun with --ignore-errors to continue anyway"
    ))]
    StructuralErrors { count: usize },
    #[snafu(display("Invalid CI configuration"))]
    RuleConfigError { source: RuleConfigError },
    #[snafu(display("{failed} CI rules failed"))]
    CiFailedError { failed: usize },
}
