use std::fmt;

/// Formats a slice as a markdown-style list, one entry per line, so lists of
/// pools and allocations read well in multiline logs.
///
/// An empty slice renders as `(empty)`.
pub struct PrettyList<'data, T>(pub &'data [T]);

impl<'data, T> PrettyList<'data, T> {
    fn write_entries(
        &self,
        f: &mut fmt::Formatter<'_>,
        mut write_entry: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
    ) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(empty)");
        }
        for entry in self.0 {
            f.write_str("\n- ")?;
            write_entry(f, entry)?;
        }
        Ok(())
    }
}

impl<'data, T> fmt::Debug for PrettyList<'data, T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alternate = f.alternate();
        self.write_entries(f, |f, entry| {
            if alternate {
                write!(f, "{:#?}", entry)
            } else {
                write!(f, "{:?}", entry)
            }
        })
    }
}

impl<'data, T> fmt::Display for PrettyList<'data, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_entries(f, |f, entry| write!(f, "{}", entry))
    }
}
