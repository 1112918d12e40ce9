//! Streaming corpus reader for N-Triples-like dumps.
//!
//! The corpus is expected to be grouped by subject (the usual layout of
//! entity dumps). One reader thread slices the stream into per-subject
//! blocks and feeds batches through a bounded queue to one worker per core;
//! workers intern the properties and invoke the caller's callback
//! concurrently. Gzip-compressed corpora (`.gz`) are decompressed on the
//! fly.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Mutex;

use flate2::read::GzDecoder;

use crate::dictionary::{PropertyDictionary, PropertyRef, TYPE_PREFIX};
use crate::error::{CorpusError, CorpusResult};

/// Predicates whose statements declare an instance-of relation; when the
/// tree is typed their objects are folded into the property stream as
/// `t#<class>` pseudo-properties.
pub const TYPE_PREDICATES: &[&str] = &[
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#type",
    "http://www.wikidata.org/prop/direct/P31",
];

/// Number of subject blocks per queue batch.
const BATCH_SIZE: usize = 32;

/// One entity's observed properties: the unit consumed by the tree.
///
/// `properties` maps each distinct (pseudo-)property to its occurrence
/// count on this subject; the tree uses only the key set.
pub struct SubjectSummary {
    pub subject_iri: String,
    pub properties: HashMap<PropertyRef, u32>,
    pub num_occurrences: u32,
}

/// Raw statements of one subject, before interning.
struct SubjectBlock {
    subject: String,
    statements: Vec<(String, String)>,
}

/// Stream up to `first_n` subjects (0 = all) from the corpus at `path`,
/// invoking `on_subject` for each from a pool of worker threads. Returns
/// the number of subjects streamed.
pub fn read<F>(
    path: &Path,
    dictionary: &PropertyDictionary,
    on_subject: F,
    first_n: u64,
    typed: bool,
) -> CorpusResult<u64>
where
    F: Fn(&SubjectSummary) + Sync,
{
    let reader = open(path)?;
    let workers = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4);

    let (tx, rx) = mpsc::sync_channel::<Vec<SubjectBlock>>(workers);
    let rx = Mutex::new(rx);
    let on_subject = &on_subject;

    let mut subjects = 0u64;
    let mut read_error: Option<CorpusError> = None;

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx = &rx;
            scope.spawn(move || loop {
                let batch = {
                    let guard = rx.lock().expect("corpus queue lock poisoned");
                    guard.recv()
                };
                let Ok(batch) = batch else { break };
                for block in batch {
                    let summary = summarize(block, dictionary, typed);
                    on_subject(&summary);
                }
            });
        }

        let mut batch: Vec<SubjectBlock> = Vec::with_capacity(BATCH_SIZE);
        let mut current: Option<SubjectBlock> = None;

        'lines: for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    read_error = Some(CorpusError::Read {
                        path: path.display().to_string(),
                        source,
                    });
                    break 'lines;
                }
            };
            let Some((subject, predicate, object)) = parse_statement(&line) else {
                if !line.trim().is_empty() && !line.trim_start().starts_with('#') {
                    tracing::warn!(line = %line.trim(), "skipping malformed corpus line");
                }
                continue;
            };

            match current.as_mut() {
                Some(block) if block.subject == subject => {
                    block.statements.push((predicate.to_string(), object.to_string()));
                }
                _ => {
                    if let Some(done) = current.take() {
                        subjects += 1;
                        batch.push(done);
                        if batch.len() == BATCH_SIZE
                            && tx.send(std::mem::take(&mut batch)).is_err()
                        {
                            break 'lines;
                        }
                        if first_n > 0 && subjects == first_n {
                            break 'lines;
                        }
                    }
                    current = Some(SubjectBlock {
                        subject: subject.to_string(),
                        statements: vec![(predicate.to_string(), object.to_string())],
                    });
                }
            }
        }

        if read_error.is_none() {
            if let Some(done) = current.take() {
                if first_n == 0 || subjects < first_n {
                    subjects += 1;
                    batch.push(done);
                }
            }
            if !batch.is_empty() {
                let _ = tx.send(batch);
            }
        }
        drop(tx);
    });

    match read_error {
        Some(err) => Err(err),
        None => Ok(subjects),
    }
}

fn open(path: &Path) -> CorpusResult<Box<dyn BufRead + Send>> {
    let file = std::fs::File::open(path).map_err(|source| CorpusError::Open {
        path: path.display().to_string(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(BufReader::new(file)))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn summarize(block: SubjectBlock, dictionary: &PropertyDictionary, typed: bool) -> SubjectSummary {
    let mut properties: HashMap<PropertyRef, u32> = HashMap::new();
    let mut num_occurrences = 0u32;
    for (predicate, object) in &block.statements {
        let record = if typed && TYPE_PREDICATES.contains(&predicate.as_str()) {
            dictionary.intern(&format!("{TYPE_PREFIX}{object}"))
        } else {
            dictionary.intern(predicate)
        };
        *properties.entry(record).or_insert(0) += 1;
        num_occurrences += 1;
    }
    SubjectSummary {
        subject_iri: block.subject,
        properties,
        num_occurrences,
    }
}

/// Split one N-Triples-like line into `(subject, predicate, object)`,
/// stripping angle brackets and the trailing dot. Comments and blank lines
/// yield `None`.
fn parse_statement(line: &str) -> Option<(&str, &str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (subject, rest) = split_token(line)?;
    let (predicate, rest) = split_token(rest)?;
    let object = rest.trim();
    let object = object
        .strip_suffix('.')
        .map(str::trim_end)
        .unwrap_or(object);
    if object.is_empty() {
        return None;
    }
    Some((strip_angles(subject), strip_angles(predicate), strip_angles(object)))
}

fn split_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let end = s.find(char::is_whitespace)?;
    Some((&s[..end], &s[end..]))
}

fn strip_angles(token: &str) -> &str {
    token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token)
}
