//! Convert stage: every eligible upload to one PDF each.
//!
//! ## Why one session for the whole batch?
//!
//! Starting LibreOffice costs seconds; converting a document usually costs
//! less. The session is opened once after discovery and reused for every
//! item. It is a `Box<dyn ConversionSession>` owned by this stack frame, so
//! an early return (or a panic) drops it and releases the engine.
//!
//! ## Partial failure
//!
//! A failing item is recorded as `fail` with its reason and the batch moves
//! on. Only a session that cannot be opened aborts the stage.
//!
//! Two uploads that differ only in extension case (`a.docx`, `a.DOCX`) map
//! to the same `a.pdf`. The first one converted keeps it; the later one is
//! recorded as `fail` instead of silently overwriting it.

use super::{remove_if_exists, Pipeline};
use crate::error::{ItemFailure, PipelineError};
use crate::registry::{ItemOutcome, TaskId};
use crate::storage::pdf_name_for;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ConvertOutput {
    /// One outcome per discovered item, in discovery order.
    pub results: Vec<ItemOutcome>,
    pub success_count: usize,
    pub pdf_folder: PathBuf,
}

impl Pipeline {
    /// Convert every eligible document of a task into `pdfs/<task_id>/`.
    ///
    /// Re-running replaces the previous run's PDFs, results and counters;
    /// the merge and package flags are left as they are.
    ///
    /// # Errors
    /// `TaskNotFound` when the upload directory does not exist,
    /// `NoConvertibleItems` when it holds no eligible document,
    /// `ConversionEngine` when the converter cannot be started.
    pub fn convert(&self, task_id: &TaskId) -> Result<ConvertOutput, PipelineError> {
        let result = self.convert_batch(task_id);
        self.finish_stage(task_id, "Conversion", result)
    }

    fn convert_batch(&self, task_id: &TaskId) -> Result<ConvertOutput, PipelineError> {
        let upload_dir = self.layout.upload_dir(task_id);
        if !upload_dir.is_dir() {
            return Err(PipelineError::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }
        self.recover_record(task_id, &upload_dir);

        let items = self.layout.discover_sources(task_id)?;
        if items.is_empty() {
            return Err(PipelineError::NoConvertibleItems {
                task_id: task_id.to_string(),
                extension: self.config.source_extension.clone(),
            });
        }
        let total = items.len();
        info!(task = %task_id, "Converting {} documents", total);

        self.registry.update(task_id, |record| {
            record.begin_convert(total);
            record.push_log(format!(
                "Starting batch conversion, task id: {task_id}, files: {total}"
            ));
        })?;

        let pdf_dir = self.layout.pdf_dir(task_id);
        if pdf_dir.exists() {
            std::fs::remove_dir_all(&pdf_dir)
                .map_err(|e| PipelineError::io("Failed to clear PDF directory", &pdf_dir, e))?;
        }
        std::fs::create_dir_all(&pdf_dir)
            .map_err(|e| PipelineError::io("Failed to create PDF directory", &pdf_dir, e))?;
        remove_if_exists(&self.layout.pdf_zip(task_id))?;

        let callback = self.callback();
        callback.on_convert_start(total);

        let mut session = self
            .converter
            .open_session()
            .map_err(PipelineError::ConversionEngine)?;
        debug!("Conversion session open for task {}", task_id);

        let mut results = Vec::with_capacity(total);
        // PDF name -> item it was converted from, in this run.
        let mut produced: HashMap<String, String> = HashMap::new();
        for (i, item) in items.iter().enumerate() {
            let index = i + 1;
            callback.on_item_start(index, total, item);
            self.registry
                .update(task_id, |record| record.current_item = item.clone())?;

            let source = upload_dir.join(item);
            let pdf_name = pdf_name_for(item);
            let dest = pdf_dir.join(&pdf_name);
            let converted = match produced.get(&pdf_name) {
                Some(first) => Err(format!("{pdf_name} was already produced from {first}")),
                None => session.convert_one(&source, &dest),
            };
            let (outcome, line) = match converted {
                Ok(()) => {
                    produced.insert(pdf_name, item.clone());
                    callback.on_item_complete(index, total, item);
                    (
                        ItemOutcome::success(item.as_str()),
                        format!("[{index}/{total}] Converted {item}"),
                    )
                }
                Err(reason) => {
                    callback.on_item_error(index, total, item, &reason);
                    let failure = ItemFailure::ConversionFailed {
                        item: item.clone(),
                        reason: reason.clone(),
                    };
                    (
                        ItemOutcome::fail(item.as_str(), reason),
                        format!("[{index}/{total}] {failure}"),
                    )
                }
            };

            if outcome.is_success() {
                info!(task = %task_id, "{}", line);
            } else {
                warn!(task = %task_id, "{}", line);
            }
            results.push(outcome.clone());
            self.registry.update(task_id, |record| {
                record.current = index;
                record.current_item = item.clone();
                record.results.push(outcome);
                record.push_log(line);
            })?;
        }
        session.close();

        let success_count = results.iter().filter(|r| r.is_success()).count();
        self.registry.update(task_id, |record| {
            record.flags.convert_done = true;
            record.current_item.clear();
            record.push_log(format!(
                "Batch conversion finished: {success_count}/{total} succeeded"
            ));
        })?;
        info!(task = %task_id, "Conversion finished: {}/{} succeeded", success_count, total);
        callback.on_convert_complete(total, success_count);

        Ok(ConvertOutput {
            results,
            success_count,
            pdf_folder: pdf_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{files, pipeline, pipeline_with};
    use super::*;
    use crate::engine::testing::FakeConverter;
    use crate::registry::ItemStatus;
    use std::sync::atomic::Ordering;

    #[test]
    fn converts_every_eligible_item_in_order() {
        let (_root, p) = pipeline();
        let up = p
            .upload(files(&["b.docx", "a.docx", "~$a.docx", "notes.txt"]))
            .unwrap();

        let out = p.convert(&up.task_id).unwrap();
        let items: Vec<_> = out.results.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["a.docx", "b.docx"]);
        assert_eq!(out.success_count, 2);
        assert!(out.pdf_folder.join("a.pdf").is_file());
        assert!(out.pdf_folder.join("b.pdf").is_file());

        let progress = p.progress(&up.task_id).unwrap();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.current, 2);
        assert_eq!(progress.current_file, "");
        assert_eq!(progress.results.len(), progress.total);
        assert!(progress.convert_done);
        assert!(!progress.done);
    }

    #[test]
    fn item_failure_does_not_stop_the_batch() {
        let (_root, p) = pipeline_with(FakeConverter::failing(&["b.docx"]));
        let up = p.upload(files(&["a.docx", "b.docx", "c.docx"])).unwrap();

        let out = p.convert(&up.task_id).unwrap();
        assert_eq!(out.success_count, 2);
        assert_eq!(out.results[1].status, ItemStatus::Fail);
        assert_eq!(out.results[1].reason.as_deref(), Some("cannot open b.docx"));
        assert!(!out.pdf_folder.join("b.pdf").exists());

        let progress = p.progress(&up.task_id).unwrap();
        assert!(progress.convert_done);
        assert!(progress
            .logs
            .iter()
            .any(|l| l.contains("b.docx: conversion failed: cannot open b.docx")));
    }

    #[test]
    fn session_is_opened_once_and_released() {
        let converter = FakeConverter::default();
        let opened = converter.opened.clone();
        let closed = converter.closed.clone();
        let (_root, p) = pipeline_with(converter);
        let up = p.upload(files(&["a.docx", "b.docx", "c.docx"])).unwrap();

        p.convert(&up.task_id).unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unavailable_engine_is_fatal_and_logged() {
        let converter = FakeConverter {
            unavailable: true,
            ..FakeConverter::default()
        };
        let (_root, p) = pipeline_with(converter);
        let up = p.upload(files(&["a.docx"])).unwrap();

        let err = p.convert(&up.task_id).unwrap_err();
        assert!(matches!(err, PipelineError::ConversionEngine(_)));

        let progress = p.progress(&up.task_id).unwrap();
        assert!(!progress.convert_done);
        assert!(progress
            .logs
            .last()
            .is_some_and(|l| l.starts_with("Conversion failed")));
    }

    #[test]
    fn no_eligible_items() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["readme.txt", "~$lock.docx"])).unwrap();
        let err = p.convert(&up.task_id).unwrap_err();
        assert!(matches!(err, PipelineError::NoConvertibleItems { .. }));
    }

    #[test]
    fn unknown_task() {
        let (_root, p) = pipeline();
        let err = p.convert(&TaskId::parse("nope").unwrap()).unwrap_err();
        assert!(matches!(err, PipelineError::TaskNotFound { .. }));
        assert!(p.registry().is_empty());
    }

    #[test]
    fn rerun_resets_and_clears_stale_outputs() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx", "b.docx"])).unwrap();
        let first = p.convert(&up.task_id).unwrap();
        std::fs::write(first.pdf_folder.join("stale.pdf"), b"old").unwrap();
        std::fs::write(p.layout().pdf_zip(&up.task_id), b"old zip").unwrap();
        let logs_before = p.progress(&up.task_id).unwrap().logs.len();

        let second = p.convert(&up.task_id).unwrap();
        assert_eq!(second.results.len(), 2);
        assert!(!second.pdf_folder.join("stale.pdf").exists());
        assert!(!p.layout().pdf_zip(&up.task_id).exists());

        let progress = p.progress(&up.task_id).unwrap();
        assert_eq!(progress.results.len(), 2);
        assert!(progress.logs.len() > logs_before);
    }

    #[test]
    fn names_differing_only_in_extension_case_do_not_overwrite() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx", "a.DOCX"])).unwrap();

        let out = p.convert(&up.task_id).unwrap();
        assert_eq!(out.results.len(), 2);
        assert_eq!(out.success_count, 1);
        assert_eq!(out.results[0].item, "a.DOCX");
        assert!(out.results[0].is_success());
        assert_eq!(out.results[1].item, "a.docx");
        assert_eq!(out.results[1].status, ItemStatus::Fail);
        assert_eq!(
            out.results[1].reason.as_deref(),
            Some("a.pdf was already produced from a.DOCX")
        );
        let pdf = std::fs::read_to_string(out.pdf_folder.join("a.pdf")).unwrap();
        assert!(pdf.contains("a.DOCX"));

        let merged = p.merge(&up.task_id).unwrap();
        assert_eq!(merged.pdf_count, 1);
        assert_eq!(p.progress(&up.task_id).unwrap().success_count(), 1);
    }

    #[test]
    fn record_is_recovered_after_restart() {
        let (_root, p) = pipeline();
        let up = p.upload(files(&["a.docx"])).unwrap();

        let restarted = Pipeline::new(
            p.config().clone(),
            std::sync::Arc::new(crate::registry::TaskRegistry::new()),
            std::sync::Arc::new(FakeConverter::default()),
            std::sync::Arc::new(crate::engine::testing::FakeMerger),
        )
        .unwrap();
        restarted.convert(&up.task_id).unwrap();

        let progress = restarted.progress(&up.task_id).unwrap();
        assert!(progress.convert_done);
        assert!(progress.logs[0].contains("recovered"));
    }
}
