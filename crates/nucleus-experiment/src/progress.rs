//! Tab-delimited progress log.
//!
//! The first line is `scenario` followed by the experiment's metadata
//! column names. Every later line is a succeeded scenario id followed by
//! its metadata values. Recovery is all-or-nothing: a header mismatch, an
//! unparsable line, an out-of-range id, a duplicate id, or a row whose
//! values disagree with the scenario's current levels discards the entire
//! log.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, warn};

/// Succeeded scenarios recovered from a log, in log order.
pub(crate) type Recovered = IndexMap<usize, Vec<String>>;

const SCENARIO_COLUMN: &str = "scenario";

fn clean(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

fn header_line(columns: &[String]) -> String {
    std::iter::once(SCENARIO_COLUMN.to_string())
        .chain(columns.iter().map(|c| clean(c)))
        .collect::<Vec<_>>()
        .join("\t")
}

fn row_line(scenario: usize, metadata: &[String]) -> String {
    std::iter::once(scenario.to_string())
        .chain(metadata.iter().map(|v| clean(v)))
        .collect::<Vec<_>>()
        .join("\t")
}

/// Read the succeeded scenarios from `path`.
///
/// `current` yields the metadata each scenario's levels produce now; a row
/// recorded under different values describes another parameter set. A
/// missing file recovers nothing. A log that does not match `columns`,
/// `scenario_count` and `current` exactly is discarded with a warning.
pub(crate) fn recover<F>(
    path: &Path,
    columns: &[String],
    scenario_count: usize,
    current: F,
) -> io::Result<Recovered>
where
    F: Fn(usize) -> Option<Vec<String>>,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Recovered::new()),
        Err(e) => return Err(e),
    };
    let mut lines = BufReader::new(file).lines();
    let expected = header_line(columns);
    match lines.next().transpose()? {
        Some(header) if header == expected => {}
        Some(_) => {
            warn!(path = %path.display(), "progress log header does not match experiment, discarding");
            return Ok(Recovered::new());
        }
        None => return Ok(Recovered::new()),
    }

    let mut recovered = Recovered::new();
    for (index, line) in lines.enumerate() {
        let line = line?;
        match parse_row(&line, columns.len(), scenario_count) {
            Some((scenario, metadata))
                if !recovered.contains_key(&scenario)
                    && matches_current(&metadata, current(scenario)) =>
            {
                recovered.insert(scenario, metadata);
            }
            _ => {
                warn!(
                    path = %path.display(),
                    line = index + 2,
                    "corrupt progress log line, discarding the whole log"
                );
                return Ok(Recovered::new());
            }
        }
    }
    debug!(path = %path.display(), recovered = recovered.len(), "recovered progress log");
    Ok(recovered)
}

fn matches_current(recorded: &[String], current: Option<Vec<String>>) -> bool {
    current.is_some_and(|values| {
        values.len() == recorded.len() && values.iter().zip(recorded).all(|(v, r)| clean(v) == *r)
    })
}

fn parse_row(line: &str, columns: usize, scenario_count: usize) -> Option<(usize, Vec<String>)> {
    let mut fields = line.split('\t');
    let scenario: usize = fields.next()?.parse().ok()?;
    if scenario >= scenario_count {
        return None;
    }
    let metadata: Vec<String> = fields.map(str::to_string).collect();
    (metadata.len() == columns).then_some((scenario, metadata))
}

/// Open progress log, rewritten at experiment open and appended per
/// success.
pub(crate) struct ProgressLog {
    writer: BufWriter<File>,
}

impl ProgressLog {
    /// Truncate `path` and write the header plus every recovered row.
    pub(crate) fn create(path: &Path, columns: &[String], recovered: &Recovered) -> io::Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", header_line(columns))?;
        for (&scenario, metadata) in recovered {
            writeln!(writer, "{}", row_line(scenario, metadata))?;
        }
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Record one success and flush.
    pub(crate) fn append(&mut self, scenario: usize, metadata: &[String]) -> io::Result<()> {
        writeln!(self.writer, "{}", row_line(scenario, metadata))?;
        self.writer.flush()
    }

    pub(crate) fn close(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_log(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nucleus-progress-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Current metadata that agrees with whatever the log recorded.
    fn rate_levels(scenario: usize) -> Option<Vec<String>> {
        Some(vec![format!("0.{}", scenario + 1)])
    }

    #[test]
    fn written_rows_are_recovered() {
        let path = temp_log("round_trip.tsv");
        let columns = cols(&["rate", "size"]);
        let mut log = ProgressLog::create(&path, &columns, &Recovered::new()).unwrap();
        log.append(3, &cols(&["0.5", "10"])).unwrap();
        log.append(1, &cols(&["0.1", "20"])).unwrap();
        log.close().unwrap();

        let current = |scenario: usize| match scenario {
            1 => Some(cols(&["0.1", "20"])),
            3 => Some(cols(&["0.5", "10"])),
            _ => None,
        };
        let recovered = recover(&path, &columns, 6, current).unwrap();
        let ids: Vec<usize> = recovered.keys().copied().collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(recovered[&1], cols(&["0.1", "20"]));
    }

    #[test]
    fn missing_file_recovers_nothing() {
        let path = temp_log("missing.tsv");
        assert!(recover(&path, &[], 1, |_| Some(Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn header_mismatch_discards_everything() {
        let path = temp_log("header.tsv");
        fs::write(&path, "scenario\tother\n0\tx\n").unwrap();
        assert!(recover(&path, &cols(&["rate"]), 2, rate_levels).unwrap().is_empty());
    }

    #[test]
    fn one_corrupt_line_discards_everything() {
        let path = temp_log("corrupt.tsv");
        fs::write(&path, "scenario\trate\n0\t0.1\nnot-a-number\t0.2\n").unwrap();
        assert!(recover(&path, &cols(&["rate"]), 2, rate_levels).unwrap().is_empty());
    }

    #[test]
    fn duplicate_or_out_of_range_ids_discard_everything() {
        let path = temp_log("dup.tsv");
        fs::write(&path, "scenario\trate\n0\t0.1\n0\t0.1\n").unwrap();
        assert!(recover(&path, &cols(&["rate"]), 2, rate_levels).unwrap().is_empty());

        fs::write(&path, "scenario\trate\n0\t0.1\n5\t0.1\n").unwrap();
        assert!(recover(&path, &cols(&["rate"]), 2, rate_levels).unwrap().is_empty());
    }

    #[test]
    fn rows_matching_current_levels_are_kept() {
        let path = temp_log("levels.tsv");
        fs::write(&path, "scenario\trate\n0\t0.1\n1\t0.2\n").unwrap();
        let recovered = recover(&path, &cols(&["rate"]), 2, rate_levels).unwrap();
        assert_eq!(recovered.len(), 2);
    }

    #[test]
    fn row_with_stale_level_values_discards_everything() {
        let path = temp_log("stale.tsv");
        fs::write(&path, "scenario\trate\n0\t0.1\n1\t0.9\n").unwrap();
        assert!(recover(&path, &cols(&["rate"]), 2, rate_levels).unwrap().is_empty());
    }

    #[test]
    fn current_values_are_compared_after_cleaning() {
        let path = temp_log("cleaned.tsv");
        fs::write(&path, "scenario\tlabel\n0\ta b\n").unwrap();
        let current = |_: usize| Some(cols(&["a\tb"]));
        assert_eq!(recover(&path, &cols(&["label"]), 1, current).unwrap().len(), 1);
    }

    #[test]
    fn create_rewrites_recovered_rows() {
        let path = temp_log("rewrite.tsv");
        fs::write(&path, "stale contents\n").unwrap();
        let mut recovered = Recovered::new();
        recovered.insert(2, cols(&["a\tb"]));
        ProgressLog::create(&path, &cols(&["x"]), &recovered)
            .unwrap()
            .close()
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "scenario\tx\n2\ta b\n");
    }
}
