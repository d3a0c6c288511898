//! Sequential provisioning of the host: system packages, the conda
//! environment and the project's Python dependencies.
//!
//! Every step may carry a probe. A probe that exits successfully means the
//! step is already satisfied and it is skipped. A failing step stops the
//! plan; steps that already ran are left as they are.

use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use failure::Fail;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Fail)]
pub enum BootstrapError {
    #[fail(display = "Step {} has an empty command", _0)]
    EmptyCommand(String),
    #[fail(display = "Step {} could not be started: {}", step, cause)]
    Spawn {
        step: String,
        #[fail(cause)]
        cause: io::Error,
    },
    #[fail(display = "Step {} failed with exit code {:?}", step, code)]
    StepFailed { step: String, code: Option<i32> },
    #[fail(display = "Could not read plan: {}", _0)]
    Plan(String),
}

/// One provisioning step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub probe: Option<Vec<String>>,
    pub run: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

/// Knobs of the built-in plan.
#[derive(Clone, Debug)]
pub struct PlanOptions {
    pub conda_env: String,
    pub python: String,
    pub requirements: String,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions {
            conda_env: "posture-face".to_string(),
            python: "3.10".to_string(),
            requirements: "requirements.txt".to_string(),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn in_env(env: &str, parts: &[&str]) -> Vec<String> {
    let mut cmd = argv(&["conda", "run", "-n", env]);
    cmd.extend(argv(parts));
    cmd
}

impl Plan {
    /// The documented install sequence.
    pub fn standard(options: &PlanOptions) -> Self {
        let env = options.conda_env.as_str();
        let python = format!("python={}", options.python);
        Plan {
            steps: vec![
                Step {
                    name: "postgresql".to_string(),
                    probe: Some(argv(&["dpkg", "-s", "postgresql"])),
                    run: argv(&["apt-get", "install", "-y", "postgresql"]),
                },
                Step {
                    name: "build-tools".to_string(),
                    probe: Some(argv(&["dpkg", "-s", "build-essential", "cmake"])),
                    run: argv(&["apt-get", "install", "-y", "build-essential", "cmake"]),
                },
                Step {
                    name: "conda-env".to_string(),
                    probe: Some(in_env(env, &["python", "--version"])),
                    run: argv(&["conda", "create", "-y", "-n", env, python.as_str()]),
                },
                Step {
                    name: "requirements".to_string(),
                    probe: None,
                    run: in_env(env, &["pip", "install", "-r", options.requirements.as_str()]),
                },
                Step {
                    name: "dlib".to_string(),
                    probe: Some(in_env(env, &["python", "-c", "import dlib"])),
                    run: in_env(env, &["pip", "install", "dlib"]),
                },
                Step {
                    name: "python-magic".to_string(),
                    probe: Some(in_env(env, &["python", "-c", "import magic"])),
                    run: in_env(env, &["pip", "install", "python-magic"]),
                },
            ],
        }
    }

    /// Read a plan from a JSON file of the form `{"steps": [...]}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BootstrapError> {
        let file = File::open(path.as_ref())
            .map_err(|e| BootstrapError::Plan(format!("{}: {}", path.as_ref().display(), e)))?;
        serde_json::from_reader(file).map_err(|e| BootstrapError::Plan(e.to_string()))
    }
}

/// Runs commands on behalf of the bootstrapper.
pub trait Shell {
    /// True if `argv` ran and exited successfully. Output is discarded.
    fn probe(&mut self, argv: &[String]) -> bool;

    /// Run `argv` attached to the terminal and report its exit code,
    /// `None` when it was killed by a signal.
    fn run(&mut self, argv: &[String]) -> io::Result<Option<i32>>;
}

/// The real thing.
pub struct SystemShell;

impl Shell for SystemShell {
    fn probe(&mut self, argv: &[String]) -> bool {
        match argv.split_first() {
            Some((program, args)) => Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false),
            None => false,
        }
    }

    fn run(&mut self, argv: &[String]) -> io::Result<Option<i32>> {
        match argv.split_first() {
            Some((program, args)) => Command::new(program).args(args).status().map(|s| s.code()),
            None => Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Ran,
}

/// Execute `plan` step by step.
pub fn run<S: Shell>(plan: &Plan, shell: &mut S) -> Result<Vec<(String, Outcome)>, BootstrapError> {
    let mut report = Vec::with_capacity(plan.steps.len());
    for (i, step) in plan.steps.iter().enumerate() {
        if step.run.is_empty() {
            return Err(BootstrapError::EmptyCommand(step.name.clone()));
        }

        let satisfied = step.probe.as_ref().map_or(false, |probe| shell.probe(probe));
        if satisfied {
            info!("[{}/{}] {}: already satisfied", i + 1, plan.steps.len(), step.name);
            report.push((step.name.clone(), Outcome::Skipped));
            continue;
        }

        info!("[{}/{}] {}: {}", i + 1, plan.steps.len(), step.name, step.run.join(" "));
        match shell.run(&step.run) {
            Ok(Some(0)) => report.push((step.name.clone(), Outcome::Ran)),
            Ok(code) => {
                warn!("{} failed, later steps were not run", step.name);
                return Err(BootstrapError::StepFailed {
                    step: step.name.clone(),
                    code,
                });
            }
            Err(cause) => {
                return Err(BootstrapError::Spawn {
                    step: step.name.clone(),
                    cause,
                })
            }
        }
    }
    Ok(report)
}

/// Render `plan` as the commands an operator would type.
pub fn describe(plan: &Plan) -> String {
    let mut out = String::new();
    for step in &plan.steps {
        out.push_str(&format!("# {}\n", step.name));
        if let Some(probe) = &step.probe {
            out.push_str(&format!("{} || ", probe.join(" ")));
        }
        out.push_str(&step.run.join(" "));
        out.push('\n');
    }
    out
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::collections::HashSet;

    /// Records every command and answers from fixed tables.
    #[derive(Default)]
    pub struct FakeShell {
        pub satisfied: HashSet<String>,
        pub failing: HashSet<String>,
        pub ran: Vec<String>,
    }

    impl Shell for FakeShell {
        fn probe(&mut self, argv: &[String]) -> bool {
            self.satisfied.contains(&argv.join(" "))
        }

        fn run(&mut self, argv: &[String]) -> io::Result<Option<i32>> {
            let line = argv.join(" ");
            self.ran.push(line.clone());
            if self.failing.contains(&line) {
                Ok(Some(100))
            } else {
                Ok(Some(0))
            }
        }
    }

    fn plan() -> Plan {
        Plan::standard(&PlanOptions::default())
    }

    #[test]
    fn test_runs_everything_on_a_fresh_host() {
        let mut shell = FakeShell::default();
        let report = run(&plan(), &mut shell).unwrap();
        assert_eq!(report.len(), 6);
        assert!(report.iter().all(|(_, outcome)| *outcome == Outcome::Ran));
        assert_eq!(shell.ran[0], "apt-get install -y postgresql");
        assert_eq!(
            shell.ran[3],
            "conda run -n posture-face pip install -r requirements.txt"
        );
    }

    #[test]
    fn test_skips_satisfied_steps() {
        let mut shell = FakeShell::default();
        shell.satisfied.insert("dpkg -s postgresql".to_string());
        shell
            .satisfied
            .insert("conda run -n posture-face python --version".to_string());

        let report = run(&plan(), &mut shell).unwrap();
        assert_eq!(report[0], ("postgresql".to_string(), Outcome::Skipped));
        assert_eq!(report[2], ("conda-env".to_string(), Outcome::Skipped));
        assert_eq!(shell.ran.len(), 4);
    }

    #[test]
    fn test_stops_at_first_failure() {
        let mut shell = FakeShell::default();
        shell
            .failing
            .insert("apt-get install -y build-essential cmake".to_string());

        match run(&plan(), &mut shell) {
            Err(BootstrapError::StepFailed { step, code }) => {
                assert_eq!(step, "build-tools");
                assert_eq!(code, Some(100));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(shell.ran.len(), 2);
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let plan = Plan {
            steps: vec![Step {
                name: "nothing".to_string(),
                probe: None,
                run: vec![],
            }],
        };
        assert!(matches!(
            run(&plan, &mut FakeShell::default()),
            Err(BootstrapError::EmptyCommand(_))
        ));
    }

    #[test]
    fn test_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"{"steps": [{"name": "cmake", "run": ["apt-get", "install", "-y", "cmake"]}]}"#,
        )
        .unwrap();

        let plan = Plan::from_file(&path).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].probe, None);
        assert!(describe(&plan).contains("apt-get install -y cmake"));
    }

    #[test]
    fn test_describe_shows_probes() {
        let text = describe(&plan());
        assert!(text.contains("dpkg -s postgresql || apt-get install -y postgresql"));
    }
}
