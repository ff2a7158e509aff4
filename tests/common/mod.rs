//! Shared test infrastructure for pipeline integration tests.
//!
//! Collaborators are replaced by small shell scripts that speak the same
//! argument and output contracts as the real encoder, preprocessor and
//! solver. Every script appends its argv to a call log.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const ENCODER_SCRIPT: &str = r#"#!/bin/sh
echo "encoder $*" >> "$FAKE_LOG"
action=""; wcnf=""; pop=""
while [ $# -gt 0 ]; do
  case "$1" in
    --wcnf) wcnf="$2"; shift ;;
    --pop) pop="$2"; shift ;;
    --action) action="$2"; shift ;;
  esac
  shift
done
if [ "$action" = "ENCODE" ]; then
  printf 'p wcnf 3 2 10\n10 1 2 0\n1 -3 0\n' > "$wcnf"
fi
if [ "$action" = "DECODE" ]; then
  printf '(pop (a1 a2))\n' > "$pop"
fi
"#;

const PREPROCESSOR_SCRIPT: &str = r#"#!/bin/sh
echo "preprocessor $*" >> "$FAKE_LOG"
input="$1"; mode="$2"; map="${3#-mapfile=}"
case "$mode" in
  preprocess)
    echo "1 2 3" > "$map"
    cat "$input"
    ;;
  reconstruct)
    [ -s "$map" ] || exit 1
    grep '^v' "$input" | sed 's/$/ 4/'
    ;;
esac
"#;

/// Solver output used by [`Toolchain::standard`].
pub const OPTIMUM_SOLVER_OUTPUT: &str = "c fake solver\no 1\ns OPTIMUM\nv -1 2 -3\n";

/// Scratch directory holding fake collaborators, inputs and a config file.
pub struct Toolchain {
    pub temp: TempDir,
    pub config: PathBuf,
    pub log: PathBuf,
}

impl Toolchain {
    pub fn standard() -> Self {
        Self::with_solver_output(OPTIMUM_SOLVER_OUTPUT, 30)
    }

    /// Build a toolchain whose solver prints `stdout` and exits with `code`.
    pub fn with_solver_output(stdout: &str, code: i32) -> Self {
        let temp = tempfile::tempdir().expect("create temp dir");
        let root = temp.path();

        let encoder = write_script(root, "encoder.sh", ENCODER_SCRIPT);
        let preprocessor = write_script(root, "preprocessor.sh", PREPROCESSOR_SCRIPT);
        let solver_script = format!(
            "#!/bin/sh\necho \"solver $*\" >> \"$FAKE_LOG\"\nprintf '%s' '{stdout}'\nexit {code}\n"
        );
        let solver = write_script(root, "solver.sh", &solver_script);

        fs::write(root.join("domain.pddl"), "(define (domain d))\n").expect("write domain");
        fs::write(root.join("problem.pddl"), "(define (problem p))\n").expect("write problem");
        fs::write(root.join("plan.txt"), "(a1)\n(a2)\n").expect("write plan");

        let config = root.join("pipeline.json");
        let config_json = serde_json::json!({
            "encoder": {
                "program": encoder,
                "memory_limit": null,
                "classpath": [],
                "main_class": "FakeMain",
            },
            "preprocessor": { "program": preprocessor },
            "solver": { "program": solver },
        });
        fs::write(
            &config,
            serde_json::to_string_pretty(&config_json).expect("serialize config"),
        )
        .expect("write config");

        let log = root.join("calls.log");
        Self { temp, config, log }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root().join("out")
    }

    /// Run the pipeline binary with the standard inputs plus `extra` args.
    pub fn run(&self, extra: &[&str]) -> Output {
        let bin = env!("CARGO_BIN_EXE_pop-opt");
        let root = self.root();
        Command::new(bin)
            .current_dir(root)
            .env("FAKE_LOG", &self.log)
            .env_remove("RUST_LOG")
            .arg("--domain")
            .arg(root.join("domain.pddl"))
            .arg("--problem")
            .arg(root.join("problem.pddl"))
            .arg("--plan")
            .arg(root.join("plan.txt"))
            .arg("--encoder")
            .arg("uniform")
            .arg("--config")
            .arg(&self.config)
            .arg("--work-dir")
            .arg(self.work_dir())
            .args(extra)
            .output()
            .expect("run pop-opt")
    }

    /// Point the config's solver at `program` instead of the fake script.
    pub fn set_solver_program(&self, program: &Path) {
        let text = fs::read_to_string(&self.config).expect("read config");
        let mut config: serde_json::Value = serde_json::from_str(&text).expect("parse config");
        config["solver"]["program"] = serde_json::json!(program.display().to_string());
        fs::write(
            &self.config,
            serde_json::to_string_pretty(&config).expect("serialize config"),
        )
        .expect("write config");
    }

    /// Collaborator calls recorded so far, one line per call.
    pub fn calls(&self) -> Vec<String> {
        match fs::read_to_string(&self.log) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn write_script(root: &Path, name: &str, body: &str) -> String {
    let path = root.join(name);
    fs::write(&path, body).expect("write script");
    let mut perms = fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path.display().to_string()
}

pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
