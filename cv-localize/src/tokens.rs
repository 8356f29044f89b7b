use crate::{Error, Result};
use std::{fmt::Display, path::Path, str::FromStr, str::SplitWhitespace};

/// Reads a whole text file, attaching the path to any IO error.
pub(crate) fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(Error::io(path))
}

/// A cursor over the whitespace separated tokens of the text formats this crate reads.
///
/// Errors report the index of the offending token so malformed files can be inspected.
pub(crate) struct Tokens<'a> {
    what: &'static str,
    tokens: SplitWhitespace<'a>,
    position: usize,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(what: &'static str, text: &'a str) -> Self {
        Self {
            what,
            tokens: text.split_whitespace(),
            position: 0,
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            what: self.what,
            token: self.position,
            message: message.into(),
        }
    }

    pub(crate) fn next_str(&mut self, name: &str) -> Result<&'a str> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| self.error(format!("unexpected end of file while reading {}", name)))?;
        self.position += 1;
        Ok(token)
    }

    /// Parses the next token, using `name` to describe the value in errors.
    pub(crate) fn next<T>(&mut self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let token = self.next_str(name)?;
        token
            .parse()
            .map_err(|e| self.error(format!("invalid {} {:?}: {}", name, token, e)))
    }

    /// Fails if any token is left.
    pub(crate) fn finish(mut self) -> Result<()> {
        match self.tokens.next() {
            Some(token) => Err(self.error(format!("trailing data starting with {:?}", token))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_typed_values() {
        let mut tokens = Tokens::new("test", " 3 -1.5\n\tword ");
        assert_eq!(tokens.next::<usize>("count").unwrap(), 3);
        assert_eq!(tokens.next::<f64>("value").unwrap(), -1.5);
        assert_eq!(tokens.next_str("name").unwrap(), "word");
        tokens.finish().unwrap();
    }

    #[test]
    fn reports_positions() {
        let mut tokens = Tokens::new("test", "1 x");
        tokens.next::<u32>("first").unwrap();
        assert!(matches!(
            tokens.next::<u32>("second"),
            Err(Error::Parse { token: 2, .. })
        ));
        assert!(matches!(
            tokens.next::<u32>("third"),
            Err(Error::Parse { token: 2, .. })
        ));
    }

    #[test]
    fn rejects_trailing_data() {
        let mut tokens = Tokens::new("test", "1 2");
        tokens.next::<u32>("first").unwrap();
        assert!(tokens.finish().is_err());
    }
}
