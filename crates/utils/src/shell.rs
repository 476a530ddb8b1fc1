/// Returns the shell binary and its "run one command" flag for this platform.
pub fn get_shell_command() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/c")
    } else {
        ("sh", "-c")
    }
}
