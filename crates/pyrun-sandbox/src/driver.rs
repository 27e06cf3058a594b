//! Fixed Python programs handed to the interpreter with `-c`
//!
//! These are trusted code; the safety filter never sees them. User source is
//! only ever read from the unit file named in `argv[1]`.

/// Compile-only check. Exit 0 when the unit compiles, 3 when `compile`
/// raised (exception-only text on stderr), 4 when the file could not be read.
pub const CHECK_SYNTAX: &str = r#"
import sys
import traceback

path = sys.argv[1]
try:
    with open(path, "rb") as handle:
        source = handle.read()
except OSError as exc:
    sys.stderr.write("%s\n" % exc.__class__.__name__)
    sys.exit(4)
try:
    compile(source, path, "exec", dont_inherit=True)
except Exception as exc:
    sys.stderr.write("".join(traceback.format_exception_only(type(exc), exc)))
    sys.exit(3)
"#;

pub const EXIT_SYNTAX_ERROR: i32 = 3;
pub const EXIT_UNREADABLE: i32 = 4;

/// Runs the unit in a fresh `__main__` namespace. The first stdin line is
/// the report path; an uncaught exception is formatted there (driver frame
/// dropped) and the process exits 1.
pub const RUN_UNIT: &str = r#"
import builtins
import os
import sys
import traceback

report_path = sys.stdin.readline().rstrip("\n")
path = os.path.abspath(sys.argv[1])
sys.argv = [path]
sys.path[0] = os.path.dirname(path)


def report(exc):
    for stream in (sys.stdout, sys.stderr):
        try:
            stream.flush()
        except Exception:
            pass
    frames = exc.__traceback__.tb_next if exc.__traceback__ is not None else None
    with open(report_path, "w", encoding="utf-8") as handle:
        handle.write("".join(traceback.format_exception(type(exc), exc, frames)))
    os._exit(1)


namespace = {"__name__": "__main__", "__file__": path, "__builtins__": builtins}
try:
    with open(path, "rb") as handle:
        code = compile(handle.read(), path, "exec", dont_inherit=True)
    exec(code, namespace)
except SystemExit as exc:
    if exc.code not in (None, 0):
        report(exc)
except BaseException as exc:
    report(exc)
"#;
