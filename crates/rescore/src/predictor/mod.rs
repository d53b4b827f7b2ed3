//! Boundary to property predictors
//!
//! Predictors are opaque: they receive peptidoforms and return one vector of
//! values per request, or nothing for requests they cannot handle. Calls can
//! be bounded in time, in which case a slow predictor is abandoned rather than
//! blocking the pipeline.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::peptide::Peptidoform;

pub mod command;

#[derive(Clone, Debug, PartialEq)]
pub struct PredictionRequest {
    pub peptidoform: Peptidoform,
    pub charge: u8,
    /// Observed retention time, for predictors that calibrate on it
    pub rt: Option<f32>,
}

/// Predicted values for one request; `None` if the request failed
pub type Prediction = Option<Vec<f64>>;

#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("prediction timed out after {0:?}")]
    Timeout(Duration),
    #[error("prediction failed: {0}")]
    Failed(String),
    #[error("predictor returned {returned} predictions for {requested} requests")]
    LengthMismatch { requested: usize, returned: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    /// Predict values for every request, in order
    fn predict(&self, requests: &[PredictionRequest]) -> Result<Vec<Prediction>, PredictorError>;
}

/// Call `predictor`, abandoning the call if it does not finish within
/// `timeout`. The work runs on a detached thread, which is left to finish on
/// its own after a timeout; its result is discarded.
pub fn predict_with_timeout(
    predictor: Arc<dyn Predictor>,
    requests: Vec<PredictionRequest>,
    timeout: Option<Duration>,
) -> Result<Vec<Prediction>, PredictorError> {
    let requested = requests.len();
    let predictions = match timeout {
        None => predictor.predict(&requests)?,
        Some(timeout) => {
            let (tx, rx) = mpsc::channel();
            std::thread::Builder::new()
                .name(format!("predict-{}", predictor.name()))
                .spawn(move || {
                    // The receiver is gone if we timed out
                    let _ = tx.send(predictor.predict(&requests));
                })?;
            match rx.recv_timeout(timeout) {
                Ok(result) => result?,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(PredictorError::Timeout(timeout))
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(PredictorError::Failed("predictor thread panicked".into()))
                }
            }
        }
    };

    if predictions.len() != requested {
        return Err(PredictorError::LengthMismatch {
            requested,
            returned: predictions.len(),
        });
    }
    Ok(predictions)
}
