use slrgrammar::Symbol;

/// A single instance of a grammar symbol, as fed to (and moved around by) the parser.
///
/// Tokens produced by a lexer reference a token symbol; the parser itself synthesises
/// rule-referencing tokens as it reduces. The `value` is the token's semantic value (for
/// synthesised tokens, the result of the production's action). `lex_state`, `row` and `col`
/// record where the token came from, if known.
#[derive(Debug)]
pub struct Token<StorageT, ActionT> {
    symbol: Symbol<StorageT>,
    value: Option<ActionT>,
    lex_state: Option<String>,
    row: Option<usize>,
    col: Option<usize>,
}

impl<StorageT, ActionT> Token<StorageT, ActionT> {
    /// Create a token with no positional context.
    pub fn new(symbol: Symbol<StorageT>, value: Option<ActionT>) -> Self {
        Token {
            symbol,
            value,
            lex_state: None,
            row: None,
            col: None,
        }
    }

    /// Create a token recording the lexer state it was produced in and its source position.
    /// `row` and `col` are 1-based.
    pub fn with_context(
        symbol: Symbol<StorageT>,
        value: Option<ActionT>,
        lex_state: Option<String>,
        row: Option<usize>,
        col: Option<usize>,
    ) -> Self {
        Token {
            symbol,
            value,
            lex_state,
            row,
            col,
        }
    }

    pub fn value(&self) -> Option<&ActionT> {
        self.value.as_ref()
    }

    /// Consume the token, returning its semantic value.
    pub fn into_value(self) -> Option<ActionT> {
        self.value
    }

    pub fn lex_state(&self) -> Option<&str> {
        self.lex_state.as_deref()
    }

    pub fn row(&self) -> Option<usize> {
        self.row
    }

    pub fn col(&self) -> Option<usize> {
        self.col
    }
}

impl<StorageT: Copy, ActionT> Token<StorageT, ActionT> {
    pub fn symbol(&self) -> Symbol<StorageT> {
        self.symbol
    }
}

#[cfg(test)]
mod test {
    use super::Token;
    use slrgrammar::{Symbol, TIdx};

    #[test]
    fn test_token_context() {
        let t = Token::<u32, u64>::new(Symbol::Token(TIdx(0)), Some(3));
        assert_eq!(t.symbol(), Symbol::Token(TIdx(0)));
        assert_eq!(t.value(), Some(&3));
        assert_eq!(t.lex_state(), None);
        assert_eq!(t.row(), None);
        assert_eq!(t.col(), None);
        assert_eq!(t.into_value(), Some(3));

        let t = Token::<u32, u64>::with_context(
            Symbol::Rule(slrgrammar::RIdx(1)),
            None,
            Some("string".to_string()),
            Some(2),
            Some(5),
        );
        assert_eq!(t.symbol(), Symbol::Rule(slrgrammar::RIdx(1)));
        assert_eq!(t.lex_state(), Some("string"));
        assert_eq!(t.row(), Some(2));
        assert_eq!(t.col(), Some(5));
        assert_eq!(t.into_value(), None);
    }
}
