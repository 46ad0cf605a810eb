//! Synthetic training run driven through a `TrainingSession`.
//!
//! A fake three-layer network trains normally for a while, then its output
//! layer starts to blow up. The demo prints alerts every epoch, a suggestion
//! every five epochs, and a final report. A snapshot is written to and
//! restored from a temporary directory.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=gradient_advisor=debug cargo run --example session_demo
//! ```

use gradient_advisor::prelude::*;
use tracing_subscriber::EnvFilter;

const LAYERS: [&str; 3] = ["embed", "hidden", "output"];
const EPOCHS: u64 = 20;

/// Produces flat gradient vectors for each layer, like a framework hook would.
struct SyntheticGradients {
    explode_from: u64,
}

impl GradientSource for SyntheticGradients {
    fn collect(&mut self, epoch: u64) -> std::result::Result<GradientStatistics, GradientSourceError> {
        if epoch == 7 {
            return Err(GradientSourceError::Unavailable(
                "backward hook missed this epoch".into(),
            ));
        }

        let decay = (-(epoch as f64) * 0.05).exp();
        let raw = LAYERS.iter().map(|layer| {
            let mut scale = 0.05 * decay;
            if *layer == "output" && epoch >= self.explode_from {
                scale *= 20f64.powi((epoch - self.explode_from + 1) as i32);
            }
            let values: Vec<f64> = (0..64)
                .map(|i| scale * ((i as f64 * 0.37 + epoch as f64).sin()))
                .collect();
            (format!("{layer}_weights"), values)
        });

        Ok(GradientStatistics::from_raw(raw))
    }
}

fn synthetic_metrics(epoch: u64) -> EpochMetrics {
    let loss = 2.3 * (-(epoch as f64) * 0.15).exp() + 0.25;
    let accuracy = 1.0 - loss / 2.6;
    EpochMetrics::new(loss, accuracy).with_validation(loss * 1.1, accuracy * 0.95)
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("gradient_advisor=info".parse()?),
        )
        .init();

    let config = AdvisorConfig::builder().loss_stagnation_epochs(4).build();
    let mut session = TrainingSession::new(config)?;
    session.setup_monitoring(LAYERS);
    session.set_hyperparams(HyperParams::new(1e-3, OptimizerKind::Adam));

    let mut source = SyntheticGradients { explode_from: 14 };

    for epoch in 0..EPOCHS {
        let metrics = synthetic_metrics(epoch);
        if session.record_epoch_from(&mut source, epoch, &metrics)? == RecordOutcome::GradientsSkipped {
            println!("Epoch {epoch}: gradients unavailable, metrics recorded");
        }

        for alert in session.check_alerts(epoch, &metrics) {
            if alert.severity >= AlertSeverity::Warning {
                println!("{}", alert.format());
            }
        }

        if epoch % 5 == 4 {
            let suggestion = session.suggestions();
            println!("\nEpoch {epoch} suggestion:");
            for line in suggestion.summary_lines() {
                println!("{line}");
            }
            println!();
        }
    }

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    session.save(&path)?;

    let mut restored = TrainingSession::new(AdvisorConfig::default())?;
    restored.load(&path)?;
    restored.suggestions();

    println!("{}", restored.report().render());
    Ok(())
}
