//! Scanner bridge: where the sell zone comes from.
//!
//! `ScannerProcess` runs the external scanner over the open tickers and reads
//! its Sell section. `SellZoneFile` reads a scanner output that already exists
//! on disk. Any failure here is fatal to the command that asked.

use crate::config::ScannerConfig;
use crate::parser::ScanOutputParser;
use scanlab_core::domain::normalize_ticker;
use scanlab_core::scan::{ScanParser, SellZoneSource};
use scanlab_core::EngineError;
use std::collections::BTreeSet;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn collaborator(context: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::Collaborator(format!("{context}: {err}"))
}

/// Runs the configured scanner as a child process.
#[derive(Debug, Clone)]
pub struct ScannerProcess {
    config: ScannerConfig,
    parser: ScanOutputParser,
}

impl ScannerProcess {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            parser: ScanOutputParser::new(),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Run the scanner over `tickers` and return its raw stdout.
    pub fn run(&self, tickers: &[String]) -> Result<String, EngineError> {
        let dir = &self.config.dir;
        if !dir.is_dir() {
            return Err(EngineError::Collaborator(format!(
                "scanner directory not found: {}",
                dir.display()
            )));
        }

        let mut tickers_file = tempfile::Builder::new()
            .prefix("scanlab-tickers-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| collaborator("creating tickers file", e))?;
        for ticker in tickers {
            writeln!(tickers_file, "{ticker}").map_err(|e| collaborator("writing tickers file", e))?;
        }
        tickers_file
            .flush()
            .map_err(|e| collaborator("writing tickers file", e))?;

        // Stdout goes to a file so a chatty scanner can't fill a pipe while we poll.
        let mut stdout = tempfile::tempfile().map_err(|e| collaborator("creating output file", e))?;
        let stdout_handle = stdout
            .try_clone()
            .map_err(|e| collaborator("creating output file", e))?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&self.config.tickers_flag)
            .arg(tickers_file.path())
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_handle))
            .stderr(Stdio::null());

        info!(
            program = %self.config.program,
            tickers = tickers.len(),
            timeout_secs = self.config.timeout_secs,
            "running scanner"
        );
        let mut child = command
            .spawn()
            .map_err(|e| collaborator(&format!("spawning {}", self.config.program), e))?;

        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EngineError::Collaborator(format!(
                        "scanner timed out after {}s",
                        self.config.timeout_secs
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(collaborator("waiting for scanner", e)),
            }
        };
        if !status.success() {
            return Err(EngineError::Collaborator(format!("scanner exited with {status}")));
        }

        let mut output = Vec::new();
        stdout
            .seek(SeekFrom::Start(0))
            .and_then(|_| stdout.read_to_end(&mut output))
            .map_err(|e| collaborator("reading scanner output", e))?;
        debug!(bytes = output.len(), "scanner finished");
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

impl SellZoneSource for ScannerProcess {
    /// Sell-section tickers from a fresh scan, limited to `candidates`.
    fn sell_zone(&self, candidates: &[String]) -> Result<BTreeSet<String>, EngineError> {
        if candidates.is_empty() {
            return Ok(BTreeSet::new());
        }
        let output = self.run(candidates)?;
        let sells = self.parser.parse(&output)?.sell_tickers();
        let zone = restrict_to(&sells, candidates);
        info!(sell = zone.len(), "scanner sell zone");
        Ok(zone)
    }
}

/// Sell zone read from a saved scanner output.
#[derive(Debug, Clone)]
pub struct SellZoneFile {
    path: PathBuf,
    parser: ScanOutputParser,
}

impl SellZoneFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parser: ScanOutputParser::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SellZoneSource for SellZoneFile {
    /// Every Sell-section ticker in the file. Names nobody holds are left in
    /// so the report can list them as untracked.
    fn sell_zone(&self, _candidates: &[String]) -> Result<BTreeSet<String>, EngineError> {
        let bytes = fs::read(&self.path)
            .map_err(|e| collaborator(&format!("reading {}", self.path.display()), e))?;
        let scan = self.parser.parse(&String::from_utf8_lossy(&bytes))?;
        let zone = scan.sell_tickers();
        if zone.is_empty() {
            warn!(path = %self.path.display(), "no sell section tickers in file");
        }
        Ok(zone)
    }
}

/// Case-insensitive, exact-symbol intersection.
fn restrict_to(sells: &BTreeSet<String>, candidates: &[String]) -> BTreeSet<String> {
    let wanted: BTreeSet<String> = candidates.iter().map(|t| normalize_ticker(t)).collect();
    sells
        .iter()
        .map(|t| normalize_ticker(t))
        .filter(|t| wanted.contains(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
🟢🟢 STRONG BUY
NVDA
🔴 SELL ZONE
TSLA
AAPL
";

    fn candidates(tickers: &[&str]) -> Vec<String> {
        tickers.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn intersection_is_exact_and_case_insensitive() {
        let sells: BTreeSet<String> = ["TSLA", "AAPL", "AA"].iter().map(|s| s.to_string()).collect();
        let zone = restrict_to(&sells, &candidates(&["tsla", "AAP", "AA"]));
        assert_eq!(zone.into_iter().collect::<Vec<_>>(), ["AA", "TSLA"]);
    }

    #[test]
    fn file_source_returns_all_sells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.txt");
        fs::write(&path, OUTPUT).unwrap();

        let zone = SellZoneFile::new(&path).sell_zone(&candidates(&["TSLA"])).unwrap();
        assert_eq!(zone.into_iter().collect::<Vec<_>>(), ["AAPL", "TSLA"]);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = SellZoneFile::new("/nonexistent/scan.txt")
            .sell_zone(&[])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_scanner_dir_is_fatal() {
        let config = ScannerConfig {
            dir: PathBuf::from("/nonexistent/scanner"),
            ..ScannerConfig::default()
        };
        let err = ScannerProcess::new(config)
            .sell_zone(&candidates(&["TSLA"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Collaborator(_)));
    }

    #[test]
    fn no_candidates_skips_the_scanner() {
        let config = ScannerConfig {
            dir: PathBuf::from("/nonexistent/scanner"),
            ..ScannerConfig::default()
        };
        assert!(ScannerProcess::new(config).sell_zone(&[]).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn process_output_is_parsed_and_restricted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out.txt"), OUTPUT).unwrap();
        let config = ScannerConfig {
            dir: dir.path().to_path_buf(),
            program: "sh".into(),
            args: vec!["-c".into(), "cat out.txt".into()],
            // `sh -c` binds the flag and path to $0 and $1; the script ignores them
            tickers_flag: "--tickers-file".into(),
            timeout_secs: 30,
        };
        let zone = ScannerProcess::new(config)
            .sell_zone(&candidates(&["tsla", "NVDA"]))
            .unwrap();
        assert_eq!(zone.into_iter().collect::<Vec<_>>(), ["TSLA"]);
    }

    #[cfg(unix)]
    #[test]
    fn slow_scanner_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScannerConfig {
            dir: dir.path().to_path_buf(),
            program: "sh".into(),
            args: vec!["-c".into(), "sleep 5".into()],
            tickers_flag: "--tickers-file".into(),
            timeout_secs: 1,
        };
        let err = ScannerProcess::new(config).run(&candidates(&["X"])).unwrap_err();
        assert!(matches!(err, EngineError::Collaborator(msg) if msg.contains("timed out")));
    }
}
