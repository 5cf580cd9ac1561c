//! Browser facade over `javelin-core`.
//!
//! The page owns the event loop: it edits files, compiles, then calls
//! [`Playground::run_slice`] from its animation frame or timer with the
//! current time. Structured results cross the boundary as JSON strings.

use std::collections::BTreeMap;

use javelin_core::debug::VariableView;
use javelin_core::lexer::ColorHint;
use javelin_core::{
    CompileOptions, CoreError, Diagnostic, ModuleId, ReplOutcome, ReplTarget, RunState, Scheduler,
    SchedulerConfig, SharedBuffer, SliceResult, SourceFile, Tick, compile, modules_from_sources,
};
use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::prelude::*;

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("failed to encode result: {0}")]
    Json(#[from] serde_json::Error),
    #[error("nothing has been compiled yet")]
    NotCompiled,
    #[error("no file named {0}")]
    UnknownFile(String),
    #[error("no test named {0}")]
    UnknownTest(String),
}

impl From<WebError> for JsValue {
    fn from(err: WebError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub path: String,
    pub diagnostics: Vec<Diagnostic>,
    pub color_hints: Vec<ColorHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileReport {
    pub files: Vec<FileReport>,
    pub global: Vec<Diagnostic>,
    /// Path of the file whose main program will run, if any.
    pub main: Option<String>,
}

#[wasm_bindgen]
pub struct Playground {
    files: BTreeMap<String, String>,
    /// Requested breakpoints by file, re-bound after every compile.
    breakpoints: BTreeMap<String, Vec<u32>>,
    scheduler: Option<Scheduler>,
    output: SharedBuffer,
    config: SchedulerConfig,
}

impl Default for Playground {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl Playground {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Playground {
        Playground {
            files: BTreeMap::new(),
            breakpoints: BTreeMap::new(),
            scheduler: None,
            output: SharedBuffer::new(),
            config: SchedulerConfig::default(),
        }
    }

    pub fn set_file(&mut self, path: &str, source: &str) {
        self.files.insert(path.to_string(), source.to_string());
    }

    pub fn remove_file(&mut self, path: &str) {
        self.files.remove(path);
        self.breakpoints.remove(path);
    }

    /// Compile every file; `current` is the file shown in the editor.
    pub fn compile(&mut self, current: Option<String>) -> Result<String, JsValue> {
        let report = self.try_compile(current.as_deref())?;
        Ok(to_json(&report)?)
    }

    pub fn start(&mut self) -> Result<(), JsValue> {
        self.try_start()?;
        Ok(())
    }

    pub fn run_slice(&mut self, max_steps: u32, now_ms: f64) -> Result<String, JsValue> {
        let result = self.try_run_slice(u64::from(max_steps), now_ms)?;
        Ok(to_json(&result)?)
    }

    /// Everything printed since the last call.
    pub fn take_output(&self) -> String {
        self.output.take()
    }

    pub fn state(&self) -> String {
        let state = self.scheduler.as_ref().map_or(RunState::Stopped, Scheduler::state);
        format!("{state:?}")
    }

    pub fn pause(&mut self) -> Result<String, JsValue> {
        let paused = self.scheduler_mut()?.pause();
        Ok(to_json(&paused)?)
    }

    pub fn resume(&mut self) -> Result<(), JsValue> {
        self.scheduler_mut()?.resume();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), JsValue> {
        self.scheduler_mut()?.stop();
        Ok(())
    }

    pub fn step_into(&mut self) -> Result<(), JsValue> {
        self.scheduler_mut()?.step_into().map_err(WebError::from)?;
        Ok(())
    }

    pub fn step_over(&mut self) -> Result<(), JsValue> {
        self.scheduler_mut()?.step_over().map_err(WebError::from)?;
        Ok(())
    }

    pub fn step_out(&mut self) -> Result<(), JsValue> {
        self.scheduler_mut()?.step_out().map_err(WebError::from)?;
        Ok(())
    }

    /// Request a breakpoint; returns the bound position or `null`.
    pub fn set_breakpoint(&mut self, path: &str, line: u32) -> Result<String, JsValue> {
        let bound = self.try_set_breakpoint(path, line)?;
        Ok(to_json(&bound)?)
    }

    pub fn clear_breakpoint(&mut self, path: &str, line: u32) -> bool {
        if let Some(lines) = self.breakpoints.get_mut(path) {
            lines.retain(|l| *l != line);
        }
        let module = self.module_id(path);
        match (self.scheduler.as_mut(), module) {
            (Some(scheduler), Some(module)) => scheduler.executable_mut().clear_breakpoint(module, line),
            _ => false,
        }
    }

    pub fn provide_input(&mut self, line: &str) -> Result<(), JsValue> {
        self.scheduler_mut()?.provide_input(line).map_err(WebError::from)?;
        Ok(())
    }

    pub fn set_speed(&mut self, steps_per_second: Option<f64>) {
        self.config.default_max_steps_per_second = steps_per_second;
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.set_max_steps_per_second(steps_per_second);
        }
    }

    /// Evaluate in the paused frame when `paused`, else standalone.
    pub fn repl(&mut self, source: &str, paused: bool) -> Result<String, JsValue> {
        let outcome = self.try_repl(source, paused)?;
        Ok(to_json(&outcome)?)
    }

    pub fn repl_submit(&mut self, source: &str, paused: bool) -> Result<u32, JsValue> {
        let target = if paused { ReplTarget::Paused } else { ReplTarget::Standalone };
        let ticket = self.scheduler_mut()?.repl_submit(source, target).map_err(WebError::from)?;
        Ok(ticket)
    }

    /// Outcome of a submitted snippet as JSON, or `null` while it runs.
    pub fn repl_poll(&mut self, ticket: u32) -> Result<String, JsValue> {
        let outcome = self.scheduler_mut()?.repl_poll(ticket);
        Ok(to_json(&outcome)?)
    }

    /// Call stack of the paused thread.
    pub fn call_stack(&self) -> Result<String, JsValue> {
        let stack = self
            .paused_thread()
            .map(|(scheduler, thread)| scheduler.call_stack(thread))
            .unwrap_or_default();
        Ok(to_json(&stack)?)
    }

    /// Variables of the paused thread's frame at `depth` (0 is the bottom frame).
    pub fn variables(&self, depth: usize) -> Result<String, JsValue> {
        let variables: Vec<VariableView> = self
            .paused_thread()
            .map(|(scheduler, thread)| scheduler.variables(thread, depth))
            .unwrap_or_default();
        Ok(to_json(&variables)?)
    }

    /// Names of runnable `@Test` methods as `Class.method`.
    pub fn tests(&self) -> Result<String, JsValue> {
        let names: Vec<String> = self
            .scheduler
            .as_ref()
            .map(|s| {
                s.executable()
                    .test_methods()
                    .into_iter()
                    .map(|t| format!("{}.{}", t.class_name, t.method_name))
                    .collect()
            })
            .unwrap_or_default();
        Ok(to_json(&names)?)
    }

    pub fn start_test(&mut self, class: &str, method: &str) -> Result<(), JsValue> {
        self.output.take();
        let scheduler = self.scheduler_mut()?;
        let entry = scheduler
            .executable()
            .test(class, method)
            .ok_or_else(|| WebError::UnknownTest(format!("{class}.{method}")))?;
        scheduler.init_test(&entry).map_err(WebError::from)?;
        Ok(())
    }
}

impl Playground {
    pub fn try_compile(&mut self, current: Option<&str>) -> Result<CompileReport, WebError> {
        let sources: Vec<SourceFile> = self
            .files
            .iter()
            .map(|(path, source)| SourceFile::new(path.clone(), source.clone()))
            .collect();
        let options = CompileOptions {
            current: current.and_then(|path| self.module_id(path)),
            last_opened: None,
        };
        let exe = compile(modules_from_sources(sources), &options);
        let report = CompileReport {
            files: exe
                .modules
                .iter()
                .map(|m| FileReport {
                    path: m.path.clone(),
                    diagnostics: exe.module_diagnostics(m.id).into_iter().cloned().collect(),
                    color_hints: m.color_hints.clone(),
                })
                .collect(),
            global: exe.diagnostics.global().to_vec(),
            main: exe.main.and_then(|m| exe.module(m.module)).map(|m| m.path.clone()),
        };

        if let Some(old) = self.scheduler.as_mut() {
            old.stop();
        }
        let mut scheduler = Scheduler::new(exe, Box::new(self.output.clone()), self.config);
        for (path, lines) in &self.breakpoints {
            let Some(module) = scheduler.executable().module_by_path(path).map(|m| m.id) else { continue };
            for line in lines {
                scheduler.executable_mut().set_breakpoint(module, *line);
            }
        }
        self.scheduler = Some(scheduler);
        tracing::debug!(files = report.files.len(), main = ?report.main, "playground compiled");
        Ok(report)
    }

    pub fn try_start(&mut self) -> Result<(), WebError> {
        self.output.take();
        self.scheduler_mut()?.start_main()?;
        Ok(())
    }

    pub fn try_run_slice(&mut self, max_steps: u64, now_ms: f64) -> Result<SliceResult, WebError> {
        Ok(self.scheduler_mut()?.run_slice(Tick { max_steps, now_ms })?)
    }

    pub fn try_set_breakpoint(&mut self, path: &str, line: u32) -> Result<Option<javelin_core::Breakpoint>, WebError> {
        if !self.files.contains_key(path) {
            return Err(WebError::UnknownFile(path.to_string()));
        }
        let lines = self.breakpoints.entry(path.to_string()).or_default();
        if !lines.contains(&line) {
            lines.push(line);
        }
        let module = self.module_id(path);
        Ok(match (self.scheduler.as_mut(), module) {
            (Some(scheduler), Some(module)) => scheduler.executable_mut().set_breakpoint(module, line),
            _ => None,
        })
    }

    pub fn try_repl(&mut self, source: &str, paused: bool) -> Result<ReplOutcome, WebError> {
        let target = if paused { ReplTarget::Paused } else { ReplTarget::Standalone };
        Ok(self.scheduler_mut()?.repl_eval(source, target)?)
    }

    fn scheduler_mut(&mut self) -> Result<&mut Scheduler, WebError> {
        self.scheduler.as_mut().ok_or(WebError::NotCompiled)
    }

    fn paused_thread(&self) -> Option<(&Scheduler, usize)> {
        let scheduler = self.scheduler.as_ref()?;
        let at = scheduler.paused_at()?;
        Some((scheduler, at.thread))
    }

    /// Module ids follow the sorted file order.
    fn module_id(&self, path: &str) -> Option<ModuleId> {
        self.files.keys().position(|p| p == path).map(|i| ModuleId(i as u32))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, WebError> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "public class Main {\n  public static void main(String[] args) {\n    int a = 0xFF8800;\n    System.out.println(a > 0);\n    System.out.println(\"done\");\n  }\n}\n";

    #[test]
    fn compiles_reports_and_runs() {
        let mut playground = Playground::new();
        playground.set_file("Main.java", PROGRAM);
        let report = playground.try_compile(Some("Main.java")).unwrap();
        assert_eq!(report.main.as_deref(), Some("Main.java"));
        assert_eq!(report.files[0].color_hints.len(), 1);
        assert!(report.files[0].diagnostics.is_empty());

        playground.try_start().unwrap();
        let slice = playground.try_run_slice(10_000, 0.0).unwrap();
        assert!(slice.finished);
        assert_eq!(playground.take_output(), "true\ndone\n");
        assert_eq!(playground.state(), "Stopped");
    }

    #[test]
    fn breakpoints_survive_recompilation() {
        let mut playground = Playground::new();
        playground.set_file("Main.java", PROGRAM);
        playground.try_compile(None).unwrap();
        let bound = playground.try_set_breakpoint("Main.java", 5).unwrap().unwrap();
        assert_eq!(bound.range.start_line, 5);

        playground.try_compile(None).unwrap();
        playground.try_start().unwrap();
        let slice = playground.try_run_slice(10_000, 0.0).unwrap();
        let at = slice.paused_at.unwrap();
        assert_eq!(at.range.start_line, 5);
        assert_eq!(playground.take_output(), "true\n");

        let outcome = playground.try_repl("a + 1", true).unwrap();
        assert_eq!(outcome.value.as_deref(), Some("16746497"));
        let json = to_json(&slice).unwrap();
        assert!(json.contains("\"paused_at\""));
    }

    #[test]
    fn unknown_file_breakpoint_is_an_error() {
        let mut playground = Playground::new();
        assert!(matches!(
            playground.try_set_breakpoint("Nope.java", 1),
            Err(WebError::UnknownFile(_))
        ));
        assert!(matches!(playground.try_start(), Err(WebError::NotCompiled)));
    }
}
