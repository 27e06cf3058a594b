//! What each command prints, as text or JSON

use pyrun_core::{CompileResult, ExecutionResult, PipelineError, SweepReport, UnitId};
use serde::Serialize;
use std::io::{self, Write};
use std::process::ExitCode;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Submitted { id: UnitId },
    Checked(CompileResult),
    Ran(ExecutionResult),
    Discarded { id: UnitId },
    Listed { units: Vec<UnitId> },
    Reclaimed(SweepReport),
    Failed { error: String },
}

impl From<PipelineError> for Outcome {
    fn from(err: PipelineError) -> Self {
        Outcome::Failed {
            error: err.to_string(),
        }
    }
}

impl Outcome {
    /// 0 on success, 1 when the snippet failed, 2 when the pipeline refused it
    pub fn status(&self) -> u8 {
        match self {
            Outcome::Checked(result) if !result.accepted => 1,
            Outcome::Ran(result) if !result.succeeded => 1,
            Outcome::Failed { .. } => 2,
            _ => 0,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }

    pub fn write_json(&self, out: &mut impl Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }

    /// Human output. Snippet stdout goes to `out` untouched, everything the
    /// snippet or pipeline complains about goes to `err`.
    pub fn write_text(&self, out: &mut impl Write, err: &mut impl Write) -> io::Result<()> {
        match self {
            Outcome::Submitted { id } => writeln!(out, "{id}"),
            Outcome::Checked(result) => match &result.diagnostic {
                Some(diagnostic) if !result.accepted => writeln!(err, "{diagnostic}"),
                _ => writeln!(out, "ok"),
            },
            Outcome::Ran(result) => {
                out.write_all(result.stdout.as_bytes())?;
                err.write_all(result.stderr.as_bytes())?;
                if let Some(exception) = &result.exception {
                    writeln!(err, "{}", exception.trim_end())?;
                }
                Ok(())
            }
            Outcome::Discarded { id } => writeln!(out, "discarded {id}"),
            Outcome::Listed { units } => {
                for id in units {
                    writeln!(out, "{id}")?;
                }
                Ok(())
            }
            Outcome::Reclaimed(report) => writeln!(
                out,
                "removed {} unit(s), {} in flight, {} failed",
                report.removed.len(),
                report.in_flight,
                report.failed
            ),
            Outcome::Failed { error } => writeln!(err, "error: {error}"),
        }
    }
}
