//! Predictor backed by an external program
//!
//! Each request is written to the program's stdin as
//! `peptide<TAB>charge<TAB>rt`, and exactly one line of tab-separated values
//! is expected back per request, in order. `NA` or an empty line marks a
//! request the program could not handle. A program still running after the
//! configured timeout is killed.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{Prediction, PredictionRequest, Predictor, PredictorError};

#[derive(Clone, Debug)]
pub struct CommandPredictor {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn drain<R: Read + Send + 'static>(source: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            source.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>, PredictorError> {
    match handle.join() {
        Ok(bytes) => Ok(bytes?),
        Err(_) => Err(PredictorError::Failed("output reader panicked".into())),
    }
}

impl CommandPredictor {
    pub fn new<S: Into<String>>(name: S, program: S, args: Vec<String>) -> Self {
        CommandPredictor {
            name: name.into(),
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Kill the program if it has not exited after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for `child` to exit, killing it once the deadline has passed
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, PredictorError> {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => return Ok(child.wait()?),
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                log::warn!("{}: killing `{}` after {:?}", self.name, self.program, timeout);
                child.kill()?;
                child.wait()?;
                return Err(PredictorError::Timeout(timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn encode(requests: &[PredictionRequest]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(requests.len() * 32);
        for req in requests {
            let rt = req.rt.map(|rt| rt.to_string()).unwrap_or_default();
            // Writing into a Vec cannot fail
            let _ = writeln!(buf, "{}\t{}\t{}", req.peptidoform, req.charge, rt);
        }
        buf
    }

    fn decode(line: &str) -> Prediction {
        let line = line.trim();
        if line.is_empty() || line.eq_ignore_ascii_case("NA") {
            return None;
        }
        line.split('\t')
            .map(|v| v.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect()
    }
}

impl Predictor for CommandPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, requests: &[PredictionRequest]) -> Result<Vec<Prediction>, PredictorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from a separate thread, so that a program writing its
        // output before consuming all input cannot deadlock us
        let input = Self::encode(requests);
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PredictorError::Failed("stdin unavailable".into()))?;
        let writer = std::thread::spawn(move || stdin.write_all(&input));
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        match writer.join() {
            Ok(Ok(())) => {}
            // A program may legitimately exit without reading everything
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(PredictorError::Failed("stdin writer panicked".into())),
        }

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(PredictorError::Failed(format!(
                "`{}` exited with {}: {}",
                self.program,
                status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let predictions = stdout.lines().map(Self::decode).collect::<Vec<_>>();
        log::debug!(
            "{}: {} of {} predictions succeeded",
            self.name,
            predictions.iter().filter(|p| p.is_some()).count(),
            requests.len()
        );
        Ok(predictions)
    }
}
