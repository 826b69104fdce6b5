//! Build a house-price regressor with a rule-based candidate generator
//!
//! The generator stands in for an LLM provider: fresh attempts return a mean
//! baseline, refinements add one more least-squares feature, and the first
//! refinement deliberately crashes to show failure feedback.
//!
//! Run with: RUST_LOG=modelsmith=debug cargo run --example build_regressor

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Array, Float64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use async_trait::async_trait;
use modelsmith::{
    BuildConfig, BuildRequest, Candidate, CandidateGenerator, DataSource, ExecutionContext,
    GenerationMode, GenerationRequest, Metric, ModelBuilder, TrainedModel, Trainer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FEATURES: [&str; 2] = ["sqft", "rooms"];

fn houses(rows: usize) -> anyhow::Result<RecordBatch> {
    let mut rng = StdRng::seed_from_u64(7);
    let sqft: Vec<f64> = (0..rows).map(|_| rng.gen_range(400.0..3_000.0)).collect();
    let rooms: Vec<f64> = (0..rows).map(|_| f64::from(rng.gen_range(1_u8..6))).collect();
    let price: Vec<f64> = sqft
        .iter()
        .zip(&rooms)
        .map(|(s, r)| 50.0 + 0.12 * s + 8.0 * r + rng.gen_range(-5.0..5.0))
        .collect();

    let schema = Arc::new(Schema::new(vec![
        Field::new("sqft", DataType::Float64, false),
        Field::new("rooms", DataType::Float64, false),
        Field::new("price", DataType::Float64, false),
    ]));
    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Float64Array::from(sqft)),
            Arc::new(Float64Array::from(rooms)),
            Arc::new(Float64Array::from(price)),
        ],
    )?)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a [f64]> {
    let array = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| anyhow::anyhow!("column '{name}' missing or not Float64"))?;
    anyhow::ensure!(array.null_count() == 0, "column '{name}' has nulls");
    Ok(array.values())
}

/// `price ~ bias + sum(w_i * feature_i)` fitted by batch gradient descent on
/// standardized features.
struct LinearTrainer {
    features: Vec<&'static str>,
    crash: bool,
}

struct LinearModel {
    features: Vec<&'static str>,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

impl TrainedModel for LinearModel {
    fn predict(&self, features: &RecordBatch) -> anyhow::Result<Vec<f64>> {
        let columns = self
            .features
            .iter()
            .map(|name| column(features, name))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((0..features.num_rows())
            .map(|row| {
                self.bias
                    + columns
                        .iter()
                        .enumerate()
                        .map(|(j, col)| self.weights[j] * (col[row] - self.means[j]) / self.scales[j])
                        .sum::<f64>()
            })
            .collect())
    }

    fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&(&self.features, &self.weights, self.bias)).unwrap_or_default()
    }
}

#[allow(clippy::cast_precision_loss)]
impl Trainer for LinearTrainer {
    fn train(&self, ctx: &ExecutionContext, train: &RecordBatch) -> anyhow::Result<Box<dyn TrainedModel>> {
        anyhow::ensure!(!self.crash, "KeyError: 'bedrooms'");

        let target = column(train, "price")?;
        let n = target.len() as f64;
        let columns = self
            .features
            .iter()
            .map(|name| column(train, name))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let means: Vec<f64> = columns.iter().map(|c| c.iter().sum::<f64>() / n).collect();
        let scales: Vec<f64> = columns
            .iter()
            .zip(&means)
            .map(|(c, m)| (c.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n).sqrt().max(1e-9))
            .collect();

        let mut weights = vec![0.0; columns.len()];
        let mut bias = target.iter().sum::<f64>() / n;
        for epoch in 0..500 {
            if ctx.is_cancelled() {
                anyhow::bail!("cancelled at epoch {epoch}");
            }
            let mut grad_w = vec![0.0; columns.len()];
            let mut grad_b = 0.0;
            for (row, y) in target.iter().enumerate() {
                let z: Vec<f64> = (0..columns.len())
                    .map(|j| (columns[j][row] - means[j]) / scales[j])
                    .collect();
                let err = bias + z.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>() - y;
                grad_b += err;
                for (g, zj) in grad_w.iter_mut().zip(&z) {
                    *g += err * zj;
                }
            }
            bias -= 0.1 * grad_b / n;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= 0.1 * g / n;
            }
        }

        let model = LinearModel {
            features: self.features.clone(),
            means,
            scales,
            weights,
            bias,
        };
        std::fs::write(ctx.work_dir().join("weights.json"), model.to_bytes())?;
        Ok(Box::new(model))
    }
}

/// Fresh: mean baseline. Refine: one more feature than the parent.
struct RuleBasedGenerator {
    refinements: AtomicUsize,
}

#[async_trait]
impl CandidateGenerator for RuleBasedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Candidate> {
        let depth = match request.mode {
            GenerationMode::Fresh => 0,
            GenerationMode::Refine { .. } => request.ancestors.len(),
        };
        let crash = request.mode != GenerationMode::Fresh
            && self.refinements.fetch_add(1, Ordering::SeqCst) == 0;
        let features: Vec<&'static str> = FEATURES.iter().copied().take(depth).collect();

        let plan = if features.is_empty() {
            "predict the mean price".to_string()
        } else {
            format!("linear regression on {}", features.join(", "))
        };
        let code = format!("fit(price ~ {})", if features.is_empty() { "1".to_string() } else { features.join(" + ") });
        Ok(Candidate::new(plan, code, Arc::new(LinearTrainer { features, crash })))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    modelsmith::logging::init();

    let config = BuildConfig::builder()
        .candidate_timeout(Duration::from_secs(30))
        .holdout_fraction(0.25)
        .build()?;
    let generator = Arc::new(RuleBasedGenerator {
        refinements: AtomicUsize::new(0),
    });

    let result = ModelBuilder::new("predict house price from size and room count")
        .metric(Metric::rmse())
        .config(config)
        .build(
            BuildRequest::new(generator)
                .dataset(DataSource::from_batch(houses(2_000)?))
                .timeout(Duration::from_secs(60))
                .max_iterations(5),
        )
        .await?;

    println!("build {} finished: {}", result.build_id(), result.terminal_reason());
    for node in result.graph().all_nodes() {
        let outcome = match (node.metric_value(), node.error()) {
            (Some(value), _) => format!("rmse = {value:.3}"),
            (None, Some(error)) => error.to_string(),
            (None, None) => node.status().to_string(),
        };
        let plan = node.source().map_or("-", |s| s.plan.as_str());
        println!("  {} (parent {:?}): {plan}: {outcome}", node.id(), node.parent());
    }

    if let Some(artifact) = result.into_best_artifact() {
        println!("winner: {} [{}]", artifact.source().plan, artifact.content_hash());
        for file in artifact.files() {
            println!("  {} ({} bytes, {})", file.key(), file.size_bytes(), file.cas_hash());
        }
    }
    Ok(())
}
