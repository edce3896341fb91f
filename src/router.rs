/// Maps free-text classifier labels onto the configured destination folders.
///
/// Labels are trimmed and case folded, then compared against the full folder
/// names. A label that names only the last segment of one folder (`Spam` for
/// `INBOX.Spam`) also matches, as long as no other folder shares that segment.
/// Anything else resolves to the inbox, so a garbled label leaves mail in
/// place instead of misfiling it.
#[derive(Clone, Debug)]
pub struct CategoryRouter {
    inbox: String,
    categories: Vec<Category>,
}

#[derive(Clone, Debug)]
struct Category {
    folded: String,
    leaf: String,
    folder: String,
}

fn fold(label: &str) -> String {
    label.trim().to_lowercase()
}

fn leaf(folded: &str) -> &str {
    folded.rsplit(['.', '/']).next().unwrap_or(folded)
}

impl CategoryRouter {
    pub fn new<I, S>(inbox: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let categories = categories
            .into_iter()
            .map(|c| {
                let folder = c.as_ref().trim().to_string();
                let folded = fold(&folder);
                Category {
                    leaf: leaf(&folded).to_string(),
                    folded,
                    folder,
                }
            })
            .collect();

        Self {
            inbox: inbox.into(),
            categories,
        }
    }

    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    /// Category names, used to build the classifier prompt.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.folder.as_str())
    }

    /// Destination folder for `label`. Total: unknown labels give the inbox.
    pub fn route(&self, label: &str) -> &str {
        let key = fold(label);
        if key.is_empty() {
            return &self.inbox;
        }

        if let Some(c) = self.categories.iter().find(|c| c.folded == key) {
            return &c.folder;
        }

        let mut by_leaf = self.categories.iter().filter(|c| c.leaf == key);
        match (by_leaf.next(), by_leaf.next()) {
            (Some(c), None) => &c.folder,
            _ => &self.inbox,
        }
    }

    /// Whether `folder` means "leave the message where it is".
    pub fn is_inbox(&self, folder: &str) -> bool {
        fold(folder) == fold(&self.inbox)
    }
}
