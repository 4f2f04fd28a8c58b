use std::fmt;

pub struct DebugEllipsis(pub Option<usize>);

impl fmt::Debug for DebugEllipsis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("...")?;
        if let Some(size) = self.0 {
            write!(f, "({size})")?;
        }
        Ok(())
    }
}

/// Debug-formats at most `limit` items of a list, eliding the rest
pub struct DebugList<'a, T>(pub &'a [T], pub usize);

impl<T: fmt::Debug> fmt::Debug for DebugList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        list.entries(self.0.iter().take(self.1));
        if self.0.len() > self.1 {
            list.entry(&DebugEllipsis(Some(self.0.len() - self.1)));
        }
        list.finish()
    }
}
