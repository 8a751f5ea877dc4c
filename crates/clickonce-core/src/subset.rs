use crate::CoreError;
use std::collections::BTreeMap;

/// Bare file names a caller asked for, each with a "found" flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetFilter {
    names: BTreeMap<String, bool>,
}

impl SubsetFilter {
    /// `None` for an empty list, which means "every file".
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Option<Self>, CoreError> {
        if names.is_empty() {
            return Ok(None);
        }
        let mut filter = Self::default();
        for name in names {
            let name = name.as_ref();
            if name.is_empty() {
                return Err(CoreError::Config("empty file name in subset".to_owned()));
            }
            filter.names.insert(name.to_owned(), false);
        }
        Ok(Some(filter))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Flag `name` as found. Names outside the filter are ignored.
    pub fn mark_found(&mut self, name: &str) {
        if let Some(found) = self.names.get_mut(name) {
            *found = true;
        }
    }

    pub fn is_found(&self, name: &str) -> bool {
        self.names.get(name).copied().unwrap_or(false)
    }

    pub fn found_count(&self) -> usize {
        self.names.values().filter(|found| **found).count()
    }

    pub fn missing(&self) -> Vec<&str> {
        self.names
            .iter()
            .filter(|(_, found)| !**found)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_means_no_filter() {
        assert!(SubsetFilter::from_names::<&str>(&[]).unwrap().is_none());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            SubsetFilter::from_names(&["a.exe", ""]),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn duplicates_collapse() {
        let filter = SubsetFilter::from_names(&["a.exe", "a.exe"]).unwrap().unwrap();
        assert_eq!(filter.missing(), vec!["a.exe"]);
    }

    #[test]
    fn mark_found_ignores_unknown_names() {
        let mut filter = SubsetFilter::from_names(&["a.exe", "b.dll"]).unwrap().unwrap();
        filter.mark_found("a.exe");
        filter.mark_found("Tool.exe.manifest");

        assert!(filter.is_found("a.exe"));
        assert!(!filter.contains("Tool.exe.manifest"));
        assert_eq!(filter.found_count(), 1);
        assert_eq!(filter.missing(), vec!["b.dll"]);
    }

    #[test]
    fn names_are_case_sensitive() {
        let filter = SubsetFilter::from_names(&["Tool.exe"]).unwrap().unwrap();
        assert!(filter.contains("Tool.exe"));
        assert!(!filter.contains("tool.exe"));
    }
}
