//! Tree and graphviz views of the resolved dependency graph.

use std::collections::HashSet;

use anyhow::bail;

use wit::dependency::Dependency;
use wit::styling::ATTENTION;
use wit::workspace::{Resolution, Workspace};

use crate::commands::{SilentExit, report_errors};

pub fn handle_inspect(ws: &Workspace, tree: bool, dot: bool) -> anyhow::Result<()> {
    let resolution = ws.resolve(false)?;

    if tree {
        print_trees(ws, &resolution)?;
    }
    if dot {
        print_dot(ws, &resolution)?;
    }

    if !resolution.is_clean() {
        report_errors(&resolution.errors);
        return Err(SilentExit { code: 1 }.into());
    }
    Ok(())
}

struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

fn print_trees(ws: &Workspace, resolution: &Resolution) -> anyhow::Result<()> {
    for dep in &ws.manifest.dependencies {
        let node = crawl(resolution, dep)?;
        let node = dedup(node, &mut Vec::new());
        print_tree(&node);
    }
    Ok(())
}

/// Walk a dependency edge into a display tree. An edge that lost to a newer
/// choice is shown as `tag->chosen` and not expanded further; a repository
/// missing from disk is flagged instead of traversed.
fn crawl(resolution: &Resolution, dep: &Dependency) -> anyhow::Result<TreeNode> {
    let store = &resolution.store;
    let package = resolution.store.lookup(&dep.name).map(|id| store.get(id));

    let Some(package) = package else {
        return Ok(missing_node(dep));
    };
    let Some(repo) = &package.repo else {
        return Ok(missing_node(dep));
    };

    let short = if repo.is_hash(&dep.specified_revision).unwrap_or(false) {
        repo.get_shortened_rev(&dep.specified_revision)?
    } else {
        dep.specified_revision.clone()
    };
    let tag = format!("{}::{short}", dep.name);

    let resolved = repo.get_commit(&dep.specified_revision)?;
    if package.revision.as_deref() != Some(resolved.as_str()) {
        let chosen = package.short_revision().unwrap_or_else(|| "?".to_string());
        return Ok(TreeNode {
            label: format!("{tag}->{chosen}"),
            children: Vec::new(),
        });
    }

    let children = repo
        .repo_entries_from_commit(&resolved)?
        .iter()
        .map(Dependency::from_entry)
        .map(|child| crawl(resolution, &child))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(TreeNode {
        label: tag,
        children,
    })
}

fn missing_node(dep: &Dependency) -> TreeNode {
    let short: String = dep.specified_revision.chars().take(8).collect();
    TreeNode {
        label: format!("{}::{short} {ATTENTION}(missing){ATTENTION:#}", dep.name),
        children: Vec::new(),
    }
}

/// Prune subtrees already printed elsewhere in this tree, identified by the
/// last eight characters of their label.
fn dedup(node: TreeNode, seen: &mut Vec<String>) -> TreeNode {
    let chars: Vec<char> = node.label.chars().collect();
    let ident: String = chars[chars.len().saturating_sub(8)..].iter().collect();
    if seen.contains(&ident) {
        return TreeNode {
            label: node.label,
            children: Vec::new(),
        };
    }
    seen.push(ident);
    TreeNode {
        label: node.label,
        children: node
            .children
            .into_iter()
            .map(|child| dedup(child, seen))
            .collect(),
    }
}

fn print_tree(node: &TreeNode) {
    println!("{}", node.label);
    print_children(0, &node.children, &[]);
}

fn print_children(depth: usize, children: &[TreeNode], done: &[usize]) {
    let mut done = done.to_vec();
    for (index, child) in children.iter().enumerate() {
        for column in 0..depth {
            print!("{}", if done.contains(&column) { "   " } else { "│  " });
        }
        if index + 1 == children.len() {
            print!("└─");
            done.push(depth);
        } else {
            print!("├─");
        }
        println!("{}", child.label);
        print_children(depth + 1, &child.children, &done);
    }
}

fn print_dot(ws: &Workspace, resolution: &Resolution) -> anyhow::Result<()> {
    let store = &resolution.store;

    println!("digraph dependencies {{");
    println!("root [label=\"[root]\"]");
    for package in store.chosen() {
        println!("{} [label=\"{}\"]", node_id("pkg", &package.id()), package.id());
    }

    let mut drawn: HashSet<(String, String)> = HashSet::new();
    for dep in &ws.manifest.dependencies {
        dot_dep(resolution, "root", dep, &mut drawn)?;
    }
    for package in store.chosen() {
        let repo = package.repo.as_ref().expect("chosen packages are materialized");
        let revision = package.revision.as_deref().expect("chosen");
        let from = node_id("pkg", &package.id());
        for entry in repo.repo_entries_from_commit(revision)? {
            let dep = Dependency::from_entry(&entry);
            dot_dep(resolution, &from, &dep, &mut drawn)?;
        }
    }

    println!("}}");
    Ok(())
}

/// Draw an edge for one dependency. When the edge's revision differs from the
/// chosen one, an intermediate dep node links to the package with a dotted
/// edge; otherwise the parent connects straight to the package.
fn dot_dep(
    resolution: &Resolution,
    from: &str,
    dep: &Dependency,
    drawn: &mut HashSet<(String, String)>,
) -> anyhow::Result<()> {
    let store = &resolution.store;
    let package = match store.lookup(&dep.name) {
        Some(id) => store.get(id),
        None => bail!("cannot generate graph with missing repo '{}'", dep.name),
    };
    let Some(repo) = &package.repo else {
        bail!("cannot generate graph with missing repo '{}'", dep.name);
    };

    let short = if repo.is_hash(&dep.specified_revision).unwrap_or(false) {
        repo.get_shortened_rev(&dep.specified_revision)?
    } else {
        dep.specified_revision.clone()
    };
    let dep_tag = format!("{}::{short}", dep.name);
    let pkg_node = node_id("pkg", &package.id());

    let resolved = repo.get_commit(&dep.specified_revision)?;
    if package.revision.as_deref() != Some(resolved.as_str()) {
        let dep_node = node_id("dep", &dep_tag);
        draw(drawn, &dep_node, &pkg_node, true);
        println!("{dep_node} [label=\"{dep_tag}\"]");
        draw(drawn, from, &dep_node, false);
    } else {
        draw(drawn, from, &pkg_node, false);
    }
    Ok(())
}

fn draw(drawn: &mut HashSet<(String, String)>, from: &str, to: &str, dotted: bool) {
    if from == to {
        return;
    }
    if drawn.insert((from.to_string(), to.to_string())) {
        let style = if dotted { " [style=dotted]" } else { "" };
        println!("{from} -> {to}{style}");
    }
}

fn node_id(kind: &str, tag: &str) -> String {
    let sanitized: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{kind}_{sanitized}")
}
