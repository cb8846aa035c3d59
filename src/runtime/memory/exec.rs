// ABOUTME: Tiny command interpreter standing in for processes in memory nodes.
// ABOUTME: Knows a handful of coreutils-style commands; the rest exit 127.

use super::MemFile;
use std::collections::BTreeMap;

/// Outcome of a command: exit code and combined output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Outcome {
    pub code: i64,
    pub output: Vec<u8>,
}

impl Outcome {
    fn ok(output: impl Into<Vec<u8>>) -> Self {
        Self {
            code: 0,
            output: output.into(),
        }
    }

    fn fail(code: i64, output: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }
}

/// Run `cmd` against a node's filesystem.
pub(super) fn interpret(
    cmd: &[String],
    stdin: &[u8],
    files: &mut BTreeMap<String, MemFile>,
) -> Outcome {
    let Some((program, args)) = cmd.split_first() else {
        return Outcome::fail(127, "empty command\n");
    };

    match program.as_str() {
        "true" => Outcome::ok(Vec::new()),
        "false" => Outcome::fail(1, Vec::new()),
        "echo" => Outcome::ok(format!("{}\n", args.join(" "))),
        "cat" if args.is_empty() => Outcome::ok(stdin),
        "cat" => {
            let mut out = Vec::new();
            for path in args {
                match files.get(path) {
                    Some(file) => out.extend_from_slice(&file.content),
                    None => {
                        out.extend_from_slice(format!("cat: {path}: No such file or directory\n").as_bytes());
                        return Outcome::fail(1, out);
                    }
                }
            }
            Outcome::ok(out)
        }
        "tee" => {
            for path in args {
                files.insert(
                    path.clone(),
                    MemFile {
                        content: stdin.to_vec(),
                        mode: 0o644,
                    },
                );
            }
            Outcome::ok(stdin)
        }
        "sh" if args.len() == 2 && args[0] == "-c" => shell(&args[1], stdin, files),
        other => Outcome::fail(127, format!("{other}: command not found\n")),
    }
}

/// `sh -c` understands `exit N` and otherwise runs the words as a command.
fn shell(script: &str, stdin: &[u8], files: &mut BTreeMap<String, MemFile>) -> Outcome {
    let words: Vec<String> = script.split_whitespace().map(str::to_string).collect();
    match words.as_slice() {
        [exit] if exit == "exit" => Outcome::ok(Vec::new()),
        [exit, code] if exit == "exit" => match code.parse::<i64>() {
            Ok(code) => Outcome::fail(code, Vec::new()),
            Err(_) => Outcome::fail(2, format!("sh: exit: {code}: numeric argument required\n")),
        },
        _ => interpret(&words, stdin, files),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(cmd: &[&str], stdin: &[u8], files: &mut BTreeMap<String, MemFile>) -> Outcome {
        let cmd: Vec<String> = cmd.iter().map(|s| s.to_string()).collect();
        interpret(&cmd, stdin, files)
    }

    #[test]
    fn true_and_false() {
        let mut files = BTreeMap::new();
        assert_eq!(run(&["true"], b"", &mut files).code, 0);
        assert_eq!(run(&["false"], b"", &mut files).code, 1);
    }

    #[test]
    fn tee_then_cat() {
        let mut files = BTreeMap::new();
        run(&["tee", "/etc/x"], b"data", &mut files);
        let out = run(&["cat", "/etc/x"], b"", &mut files);
        assert_eq!(out, Outcome::ok(b"data".to_vec()));
    }

    #[test]
    fn cat_missing_file_fails() {
        let out = run(&["cat", "/nope"], b"", &mut BTreeMap::new());
        assert_eq!(out.code, 1);
        assert!(String::from_utf8_lossy(&out.output).contains("No such file"));
    }

    #[test]
    fn shell_exit_codes() {
        let mut files = BTreeMap::new();
        assert_eq!(run(&["sh", "-c", "exit 3"], b"", &mut files).code, 3);
        assert_eq!(run(&["sh", "-c", "echo hi"], b"", &mut files).output, b"hi\n");
    }

    #[test]
    fn unknown_command_is_127() {
        assert_eq!(run(&["kubectl", "get", "nodes"], b"", &mut BTreeMap::new()).code, 127);
    }
}
