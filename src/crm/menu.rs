//! Navigation menu resolution, permission string matching and menu change detection.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::models::{MenuItem, MenuItemState, PermissionFlags, TrackedMenuItem};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MenuNode {
    pub id: i64,
    pub name: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub permissions: PermissionFlags,
    pub children: Vec<MenuNode>,
}

/// Items the caller may see. Admins see every visible item with full rights.
pub fn visible_items<'a>(
    items: &'a [MenuItem],
    permissions: &HashMap<i64, PermissionFlags>,
    is_admin: bool,
) -> Vec<(&'a MenuItem, PermissionFlags)> {
    items
        .iter()
        .filter(|item| item.is_visible)
        .filter_map(|item| {
            if is_admin {
                return Some((
                    item,
                    PermissionFlags {
                        can_view: true,
                        can_add: true,
                        can_edit: true,
                        can_delete: true,
                    },
                ));
            }
            permissions
                .get(&item.id)
                .filter(|p| p.can_view)
                .map(|p| (item, *p))
        })
        .collect()
}

/// Nest by `parent_id`, sort siblings by `sort_order`, and drop leaves without a path.
/// Children whose parent is not visible are dropped with it.
pub fn build_menu_tree(items: &[(&MenuItem, PermissionFlags)]) -> Vec<MenuNode> {
    let mut by_parent: BTreeMap<Option<i64>, Vec<(&MenuItem, PermissionFlags)>> = BTreeMap::new();
    for (item, perms) in items {
        by_parent.entry(item.parent_id).or_default().push((item, *perms));
    }
    build_level(None, &by_parent)
}

fn build_level(
    parent: Option<i64>,
    by_parent: &BTreeMap<Option<i64>, Vec<(&MenuItem, PermissionFlags)>>,
) -> Vec<MenuNode> {
    let Some(siblings) = by_parent.get(&parent) else {
        return Vec::new();
    };

    let mut nodes: Vec<MenuNode> = siblings
        .iter()
        .filter_map(|(item, perms)| {
            let children = build_level(Some(item.id), by_parent);
            let has_path = item.path.as_deref().is_some_and(|p| !p.is_empty());
            if children.is_empty() && !has_path {
                return None;
            }
            Some(MenuNode {
                id: item.id,
                name: item.name.clone(),
                path: item.path.clone(),
                icon: item.icon.clone(),
                sort_order: item.sort_order,
                permissions: *perms,
                children,
            })
        })
        .collect();
    nodes.sort_by_key(|n| (n.sort_order, n.id));
    nodes
}

/// Basic menu handed to administrators when nothing resolves.
pub fn fallback_menu() -> Vec<MenuNode> {
    let full = PermissionFlags {
        can_view: true,
        can_add: true,
        can_edit: true,
        can_delete: true,
    };
    [
        (1, "Dashboard", "/dashboard", "layout-dashboard", 10),
        (2, "Organization", "/organization", "building", 20),
        (3, "People", "/people", "users", 30),
        (4, "Sales", "/sales", "trending-up", 40),
        (5, "Admin", "/admin", "settings", 100),
    ]
    .into_iter()
    .map(|(id, name, path, icon, sort_order)| MenuNode {
        id,
        name: name.to_string(),
        path: Some(path.to_string()),
        icon: Some(icon.to_string()),
        sort_order,
        permissions: full,
        children: Vec::new(),
    })
    .collect()
}

/// Resolve the menu tree for a role, falling back to the basic menu for admins.
pub fn resolve_menu(
    items: &[MenuItem],
    permissions: &HashMap<i64, PermissionFlags>,
    is_admin: bool,
) -> Vec<MenuNode> {
    let visible = visible_items(items, permissions, is_admin);
    let tree = build_menu_tree(&visible);
    if tree.is_empty() && is_admin {
        return fallback_menu();
    }
    tree
}

/// Permission-string check: `*`, `resource`, `resource.action`, `resource.*`,
/// or a `prefix/*` wildcard covering the resource.
pub fn has_permission(permissions: &[String], resource: &str, action: &str, is_admin: bool) -> bool {
    if is_admin {
        return true;
    }
    let exact_action = format!("{}.{}", resource, action);
    let resource_wildcard = format!("{}.*", resource);

    permissions.iter().any(|perm| {
        perm == "*"
            || perm == resource
            || *perm == exact_action
            || *perm == resource_wildcard
            || perm
                .strip_suffix("/*")
                .is_some_and(|prefix| resource.starts_with(prefix))
    })
}

// ---------------------------------------------------------------------------
// Change detection
// ---------------------------------------------------------------------------

pub fn fingerprint(state: &MenuItemState) -> String {
    let encoded = serde_json::to_vec(state).unwrap_or_default();
    blake3::hash(&encoded).to_hex().to_string()
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MenuChanges {
    pub added: Vec<MenuItemState>,
    pub removed: Vec<MenuItemState>,
    pub modified: Vec<MenuModification>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MenuModification {
    pub before: MenuItemState,
    pub after: MenuItemState,
}

impl MenuChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

pub fn detect_changes(current: &[MenuItem], tracked: &[TrackedMenuItem]) -> MenuChanges {
    let tracked_by_id: HashMap<i64, &TrackedMenuItem> =
        tracked.iter().map(|t| (t.menu_item_id, t)).collect();
    let current_ids: HashMap<i64, ()> = current.iter().map(|i| (i.id, ())).collect();

    let mut changes = MenuChanges::default();
    for item in current {
        let state = MenuItemState::from(item);
        match tracked_by_id.get(&item.id) {
            None => changes.added.push(state),
            Some(previous) if previous.state_hash != fingerprint(&state) => {
                changes.modified.push(MenuModification {
                    before: previous.state.clone(),
                    after: state,
                })
            }
            Some(_) => {}
        }
    }
    changes.removed = tracked
        .iter()
        .filter(|t| !current_ids.contains_key(&t.menu_item_id))
        .map(|t| t.state.clone())
        .collect();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, parent: Option<i64>, name: &str, path: Option<&str>, order: i32) -> MenuItem {
        MenuItem {
            id,
            parent_id: parent,
            name: name.to_string(),
            path: path.map(String::from),
            icon: None,
            is_visible: true,
            sort_order: order,
        }
    }

    fn view_only() -> PermissionFlags {
        PermissionFlags {
            can_view: true,
            ..Default::default()
        }
    }

    fn sample() -> Vec<MenuItem> {
        vec![
            item(1, None, "Dashboard", Some("/dashboard"), 10),
            item(9, None, "Sales", None, 40),
            item(12, Some(9), "Quotations", Some("/sales/quotations"), 43),
            item(10, Some(9), "Leads", Some("/sales/leads"), 41),
            item(15, None, "Admin", None, 100),
        ]
    }

    // -------------------------------------------------------------------------
    // Tree building
    // -------------------------------------------------------------------------

    #[test]
    fn test_admin_sees_all_and_empty_groups_dropped() {
        let tree = resolve_menu(&sample(), &HashMap::new(), true);
        let names: Vec<_> = tree.iter().map(|n| n.name.as_str()).collect();
        // Admin has no children and no path
        assert_eq!(names, vec!["Dashboard", "Sales"]);
        let children: Vec<_> = tree[1].children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(children, vec!["Leads", "Quotations"]);
        assert!(tree[0].permissions.can_delete);
    }

    #[test]
    fn test_role_sees_only_viewable() {
        let perms: HashMap<i64, PermissionFlags> = [
            (1, view_only()),
            (9, view_only()),
            (10, view_only()),
            (12, PermissionFlags::default()),
        ]
        .into_iter()
        .collect();
        let tree = resolve_menu(&sample(), &perms, false);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[1].children.len(), 1);
        assert_eq!(tree[1].children[0].name, "Leads");
        assert!(!tree[1].children[0].permissions.can_edit);
    }

    #[test]
    fn test_child_without_visible_parent_dropped() {
        let perms: HashMap<i64, PermissionFlags> = [(10, view_only())].into_iter().collect();
        assert!(resolve_menu(&sample(), &perms, false).is_empty());
    }

    #[test]
    fn test_hidden_items_excluded_even_for_admin() {
        let mut items = sample();
        items[0].is_visible = false;
        let tree = resolve_menu(&items, &HashMap::new(), true);
        assert!(tree.iter().all(|n| n.name != "Dashboard"));
    }

    #[test]
    fn test_admin_fallback_menu() {
        let tree = resolve_menu(&[], &HashMap::new(), true);
        let orders: Vec<_> = tree.iter().map(|n| n.sort_order).collect();
        assert_eq!(orders, vec![10, 20, 30, 40, 100]);
        assert_eq!(tree[4].path.as_deref(), Some("/admin"));
        assert!(resolve_menu(&[], &HashMap::new(), false).is_empty());
    }

    // -------------------------------------------------------------------------
    // Permission strings
    // -------------------------------------------------------------------------

    #[test]
    fn test_permission_matching() {
        let perms = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(has_permission(&perms(&["*"]), "leads", "edit", false));
        assert!(has_permission(&perms(&["leads"]), "leads", "edit", false));
        assert!(has_permission(&perms(&["leads.edit"]), "leads", "edit", false));
        assert!(!has_permission(&perms(&["leads.view"]), "leads", "edit", false));
        assert!(has_permission(&perms(&["leads.*"]), "leads", "delete", false));
        assert!(has_permission(&perms(&["sales/*"]), "sales/leads", "view", false));
        assert!(!has_permission(&perms(&["sales/*"]), "admin/users", "view", false));
        assert!(has_permission(&[], "anything", "view", true));
        assert!(!has_permission(&[], "anything", "view", false));
    }

    // -------------------------------------------------------------------------
    // Change detection
    // -------------------------------------------------------------------------

    fn tracked(item: &MenuItem) -> TrackedMenuItem {
        let state = MenuItemState::from(item);
        TrackedMenuItem {
            menu_item_id: item.id,
            state_hash: fingerprint(&state),
            state,
        }
    }

    #[test]
    fn test_fingerprint_stable_and_sensitive() {
        let a = MenuItemState::from(&item(1, None, "Dashboard", Some("/d"), 10));
        let b = MenuItemState::from(&item(1, None, "Dashboard", Some("/d"), 11));
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_detect_changes() {
        let before = sample();
        let snapshot: Vec<_> = before.iter().map(tracked).collect();

        let mut after = before.clone();
        after.retain(|i| i.id != 15);
        after[0].name = "Home".into();
        after.push(item(20, None, "Reports", Some("/reports"), 60));

        let changes = detect_changes(&after, &snapshot);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].id, 20);
        assert_eq!(changes.removed.len(), 1);
        assert_eq!(changes.removed[0].id, 15);
        assert_eq!(changes.modified.len(), 1);
        assert_eq!(changes.modified[0].before.name, "Dashboard");
        assert_eq!(changes.modified[0].after.name, "Home");

        assert!(detect_changes(&before, &snapshot).is_empty());
    }
}
