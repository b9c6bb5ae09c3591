//! POSIX shell quoting

use std::borrow::Cow;

/// Quote a single shell word for the remote POSIX shell.
///
/// Words made only of safe characters are returned unchanged so that the
/// default remote layout renders exactly as plain text. Anything else is
/// wrapped in single quotes. Always uses POSIX rules, whatever the local
/// platform.
pub fn quote(word: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(word))
}
