//! Line-oriented forwarding of the child's merged output.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::events::{Diagnostic, EventSink, LineSource, OutputLine};
use crate::filter::OutputFilter;

/// Counters reported when the output stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputStats {
    pub forwarded: usize,
    pub suppressed: usize,
}

/// Read `reader` to EOF, forwarding every non-noise line to `sink`.
///
/// A trailing line without a newline is still forwarded when the stream
/// closes. Bytes that are not valid UTF-8 are replaced rather than dropped.
/// A read error is reported as a transient diagnostic and ends the loop.
pub async fn forward_output<R>(
    reader: R,
    filter: Arc<OutputFilter>,
    sink: Arc<dyn EventSink>,
) -> OutputStats
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut stats = OutputStats::default();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end();
                if filter.is_noise(line) {
                    stats.suppressed += 1;
                    tracing::trace!(line = %line, "Suppressed process output");
                } else {
                    stats.forwarded += 1;
                    sink.emit(OutputLine::new(line, LineSource::ProcessStream).into());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed reading process output");
                sink.emit(
                    Diagnostic::error(
                        LineSource::ProcessStream,
                        format!("Error reading tunnel output: {e}"),
                    )
                    .into(),
                );
                break;
            }
        }
    }

    tracing::debug!(
        forwarded = stats.forwarded,
        suppressed = stats.suppressed,
        "Process output stream closed"
    );
    stats
}
