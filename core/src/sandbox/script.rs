use std::path::Path;

use sage_protocol::IMAGE_MARKER;
use sha2::{Digest, Sha256};

/// File name of the driver inside the environment's working directory.
pub const DRIVER_SCRIPT_NAME: &str = "script.py";

/// Extensions the snapshot diff watches for output artifacts.
pub const OUTPUT_EXTENSIONS: &[&str] = &[
  "png", "jpg", "xlsx", "xls", "csv", "txt", "json", "pdf", "docx",
];

const NAME_PREFIX: &str = "sandbox_";
const NAME_HASH_CHARS: usize = 12;

/// Deterministic environment name for a session id.
pub fn environment_name(session_id: &str) -> String {
  let digest = hex::encode(Sha256::digest(session_id.as_bytes()));
  format!("{NAME_PREFIX}{}", &digest[..NAME_HASH_CHARS])
}

/// Removes a surrounding ```` ``` ```` / ```` ```python ```` fence.
pub fn strip_code_fence(code: &str) -> String {
  let trimmed = code.trim();
  let Some(body) = trimmed.strip_prefix("```") else {
    return trimmed.to_string();
  };
  // Drop the info string on the opening line.
  let body = match body.split_once('\n') {
    Some((_info, rest)) => rest,
    None => body.trim_start_matches("python"),
  };
  body
    .trim_end()
    .strip_suffix("```")
    .unwrap_or(body)
    .trim()
    .to_string()
}

/// Replaces literal occurrences of the host path of `host_file` with its
/// bare file name, since the environment only sees the synced basename.
///
/// Heuristic text substitution: the code is not parsed, so a path that
/// happens to appear inside an unrelated string is rewritten as well. The
/// bare `/name` form is left alone because it would also hit absolute
/// paths that point elsewhere inside the environment.
pub fn rewrite_host_paths(code: &str, host_file: &Path, upload_dir: &str) -> String {
  let full = host_file.display().to_string();
  // Both separators, so paths uploaded from Windows clients resolve too.
  let file_name = full.rsplit(['/', '\\']).next().unwrap_or_default();
  if file_name.is_empty() {
    return code.to_string();
  }

  let forward = full.replace('\\', "/");
  let doubled = full.replace('\\', "\\\\");
  let upload_dir = upload_dir.trim_end_matches(['/', '\\']);
  let candidates = [
    full.clone(),
    forward,
    doubled,
    format!("{upload_dir}/{file_name}"),
    format!("./{file_name}"),
  ];

  let mut rewritten = code.to_string();
  for candidate in candidates {
    if candidate != file_name && !candidate.is_empty() {
      rewritten = rewritten.replace(&candidate, file_name);
    }
  }
  rewritten
}

/// Wraps user code in the driver that imports the usual data libraries,
/// turns runtime errors into stdout text and saves any open figure.
pub fn build_driver(code: &str, workdir: &str) -> String {
  // A JSON string literal is also a valid Python string literal.
  let source = serde_json::Value::String(code.to_string()).to_string();
  let workdir = serde_json::Value::String(workdir.to_string()).to_string();
  format!(
    r#"import os, sys, time, traceback
os.chdir({workdir})
try:
    import matplotlib
    matplotlib.use("Agg")
    import matplotlib.pyplot as plt
except Exception:
    plt = None
try:
    import pandas as pd
except Exception:
    pd = None
try:
    import numpy as np
except Exception:
    np = None

__user_code = {source}
__scope = {{"__name__": "__main__", "pd": pd, "np": np, "plt": plt}}
try:
    exec(compile(__user_code, "<sandbox>", "exec"), __scope)
except Exception as e:
    print(f"Runtime Error: {{e}}")
finally:
    try:
        if plt is not None and plt.get_fignums():
            __plot = f"plot_{{int(time.time() * 1000)}}.png"
            plt.savefig(__plot)
            plt.close("all")
            print("{IMAGE_MARKER}" + __plot)
    except Exception as e:
        print(f"Plot Error: {{e}}")
    sys.stdout.flush()
"#
  )
}
