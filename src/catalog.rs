//! Notebook and tag listings.

use anyhow::Result;

use crate::models::Notebook;
use crate::session::Session;

/// `stack » name` for stacked notebooks, the bare name otherwise.
pub fn notebook_label(notebook: &Notebook) -> String {
    match notebook.stack.as_deref() {
        Some(stack) if !stack.is_empty() => format!("{} » {}", stack, notebook.name),
        _ => notebook.name.clone(),
    }
}

pub async fn run_notebooks(session: &Session) -> Result<()> {
    for notebook in session.notebooks().await? {
        let marker = if notebook.default_notebook { " (default)" } else { "" };
        println!("{}{}  {}", notebook_label(&notebook), marker, notebook.guid);
    }
    Ok(())
}

pub async fn run_notebook_create(session: &Session, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Notebook name is required");
    }
    let notebook = session.create_notebook(name).await?;
    println!("Newly created notebook: {}  {}", notebook.name, notebook.guid);
    Ok(())
}

pub async fn run_tags(session: &Session) -> Result<()> {
    for name in session.tag_names().await? {
        println!("{}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacked_notebooks_show_their_stack() {
        let mut nb = Notebook {
            guid: "g".into(),
            name: "Recipes".into(),
            stack: Some("Home".into()),
            default_notebook: false,
        };
        assert_eq!(notebook_label(&nb), "Home » Recipes");
        nb.stack = Some(String::new());
        assert_eq!(notebook_label(&nb), "Recipes");
        nb.stack = None;
        assert_eq!(notebook_label(&nb), "Recipes");
    }
}
