use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::DatabaseSchema;

/// Summary of FK graph structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FkGraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for FK dependency ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FkGraphReport {
    pub summary: FkGraphSummary,
    pub topo_order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
}

/// Insert order for every table of a schema.
///
/// `order` always covers all tables. Tables on a cycle are placed together in
/// name order after the tables they reference, and `cycle` lists them;
/// tables that merely depend on a cycle still follow their parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOrder {
    pub order: Vec<String>,
    pub cycle: Option<Vec<String>>,
}

/// Build a deterministic FK dependency report for a schema.
pub fn build_fk_graph_report(schema: &DatabaseSchema) -> FkGraphReport {
    let graph = build_adjacency(schema);
    let nodes = graph.len();
    let edges = graph.values().map(|targets| targets.len()).sum();
    let summary = FkGraphSummary { nodes, edges };

    match toposort(&graph) {
        Ok(order) => FkGraphReport {
            summary,
            topo_order: Some(order),
            cycle: None,
        },
        Err((_, cycle)) => FkGraphReport {
            summary,
            topo_order: None,
            cycle: Some(cycle),
        },
    }
}

/// Parents-first order of the schema's tables, ties broken by name.
pub fn dependency_order(schema: &DatabaseSchema) -> DependencyOrder {
    let graph = build_adjacency(schema);
    match toposort(&graph) {
        Ok(order) => DependencyOrder { order, cycle: None },
        Err((order, cycle)) => DependencyOrder {
            order,
            cycle: Some(cycle),
        },
    }
}

/// Edges run from a referenced table to the tables that reference it.
///
/// Self references and references to tables outside the schema do not
/// constrain the order and are skipped.
fn build_adjacency(schema: &DatabaseSchema) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let known: BTreeSet<&str> = schema.tables.iter().map(|table| table.name.as_str()).collect();

    for table in &schema.tables {
        graph.entry(table.name.clone()).or_default();

        for fk in &table.foreign_keys {
            if fk.is_self_reference(&table.name) || !known.contains(fk.referenced_table.as_str()) {
                continue;
            }
            graph
                .entry(fk.referenced_table.clone())
                .or_default()
                .insert(table.name.clone());
        }
    }

    graph
}

/// Parents-first order over the graph's strongly connected components.
///
/// Members of a cycle are emitted together, in name order, once every table
/// they reference outside the cycle is placed; tables depending on a cycle
/// follow it. Returns `Err((order, cyclic))` when any cycle exists, with
/// `order` still covering every node.
fn toposort(
    graph: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>, (Vec<String>, Vec<String>)> {
    let components = strongly_connected(graph);

    let mut owner: BTreeMap<&str, usize> = BTreeMap::new();
    for (id, component) in components.iter().enumerate() {
        for member in component {
            owner.insert(member.as_str(), id);
        }
    }

    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    let mut indegree = vec![0usize; components.len()];
    for (node, targets) in graph {
        let Some(&from) = owner.get(node.as_str()) else {
            continue;
        };
        for target in targets {
            let Some(&to) = owner.get(target.as_str()) else {
                continue;
            };
            if from != to && edges[from].insert(to) {
                indegree[to] += 1;
            }
        }
    }

    // Components are keyed by their first member name so ties break by name.
    let mut ready: BTreeSet<(&str, usize)> = components
        .iter()
        .enumerate()
        .filter(|(id, _)| indegree[*id] == 0)
        .map(|(id, component)| (component[0].as_str(), id))
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some((_, id)) = ready.pop_first() {
        order.extend(components[id].iter().cloned());
        for &to in &edges[id] {
            indegree[to] -= 1;
            if indegree[to] == 0 {
                ready.insert((components[to][0].as_str(), to));
            }
        }
    }

    let cyclic: BTreeSet<String> = components
        .iter()
        .filter(|component| component.len() > 1)
        .flatten()
        .cloned()
        .collect();
    if cyclic.is_empty() {
        Ok(order)
    } else {
        Err((order, cyclic.into_iter().collect()))
    }
}

/// Tarjan's algorithm; each component is sorted by name.
fn strongly_connected(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    struct Tarjan<'g> {
        graph: &'g BTreeMap<String, BTreeSet<String>>,
        index: BTreeMap<&'g str, usize>,
        lowlink: BTreeMap<&'g str, usize>,
        stack: Vec<&'g str>,
        on_stack: BTreeSet<&'g str>,
        components: Vec<Vec<String>>,
    }

    impl<'g> Tarjan<'g> {
        fn visit(&mut self, node: &'g str) {
            let graph = self.graph;
            let position = self.index.len();
            self.index.insert(node, position);
            self.lowlink.insert(node, position);
            self.stack.push(node);
            self.on_stack.insert(node);

            let mut low = position;
            for target in graph.get(node).into_iter().flatten() {
                let target = target.as_str();
                match self.index.get(target).copied() {
                    None => {
                        self.visit(target);
                        if let Some(&target_low) = self.lowlink.get(target) {
                            low = low.min(target_low);
                        }
                    }
                    Some(target_index) if self.on_stack.contains(target) => {
                        low = low.min(target_index);
                    }
                    Some(_) => {}
                }
            }
            self.lowlink.insert(node, low);

            if low == position {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack.remove(member);
                    component.push(member.to_string());
                    if member == node {
                        break;
                    }
                }
                component.sort();
                self.components.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        graph,
        index: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        components: Vec::new(),
    };
    for node in graph.keys() {
        if !tarjan.index.contains_key(node.as_str()) {
            tarjan.visit(node.as_str());
        }
    }
    tarjan.components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ForeignKey, PrimaryKey};
    use crate::schema::{Column, DatabaseSchema, Table};
    use crate::types::ColumnKind;

    fn column(name: &str) -> Column {
        Column {
            ordinal_position: 1,
            name: name.to_string(),
            kind: ColumnKind::Integer,
            native_type: "integer".to_string(),
            is_nullable: false,
            is_auto_increment: name == "id",
            is_identity_always: false,
            is_generated: false,
        }
    }

    fn fk(column: &str, referenced: &str) -> ForeignKey {
        ForeignKey {
            name: Some(format!("fk_{column}_{referenced}")),
            columns: vec![column.to_string()],
            referenced_table: referenced.to_string(),
            referenced_columns: vec!["id".to_string()],
        }
    }

    fn table(name: &str, fks: Vec<ForeignKey>) -> Table {
        let mut columns = vec![column("id")];
        columns.extend(fks.iter().map(|fk| column(&fk.columns[0])));
        Table {
            name: name.to_string(),
            columns,
            primary_key: Some(PrimaryKey {
                name: None,
                columns: vec!["id".to_string()],
            }),
            foreign_keys: fks,
        }
    }

    fn schema(tables: Vec<Table>) -> DatabaseSchema {
        DatabaseSchema {
            engine: "postgres".to_string(),
            namespace: Some("public".to_string()),
            tables,
        }
    }

    #[test]
    fn toposort_orders_dependencies() {
        let schema = schema(vec![
            table("flashcards", vec![fk("user_id", "users")]),
            table("users", Vec::new()),
        ]);

        let report = build_fk_graph_report(&schema);
        let order = report.topo_order.expect("expected toposort");
        let users_idx = order.iter().position(|item| item == "users").unwrap();
        let cards_idx = order.iter().position(|item| item == "flashcards").unwrap();
        assert!(users_idx < cards_idx);
        assert_eq!(report.summary.edges, 1);
    }

    #[test]
    fn self_references_do_not_block_ordering() {
        let schema = schema(vec![table("categories", vec![fk("parent_id", "categories")])]);

        let order = dependency_order(&schema);
        assert_eq!(order.order, vec!["categories".to_string()]);
        assert!(order.cycle.is_none());
    }

    #[test]
    fn cycles_are_reported_as_one_block() {
        let schema = schema(vec![
            table("a", vec![fk("b_id", "b")]),
            table("b", vec![fk("a_id", "a")]),
            table("c", Vec::new()),
        ]);

        let report = build_fk_graph_report(&schema);
        assert!(report.topo_order.is_none());
        assert_eq!(report.cycle, Some(vec!["a".to_string(), "b".to_string()]));

        let order = dependency_order(&schema);
        assert_eq!(order.order, vec!["a", "b", "c"]);
        assert_eq!(order.cycle, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn dependents_of_a_cycle_follow_it() {
        let schema = schema(vec![
            table("a", vec![fk("b_id", "b")]),
            table("b", vec![fk("a_id", "a")]),
            table("aa_child", vec![fk("b_id", "b")]),
            table("root", Vec::new()),
            table("x", vec![fk("root_id", "root")]),
            table("y", vec![fk("x_id", "x")]),
            table("z_leaf", vec![fk("y_id", "y"), fk("root_id", "root")]),
        ]);

        let order = dependency_order(&schema);
        assert_eq!(order.cycle, Some(vec!["a".to_string(), "b".to_string()]));
        let position = |name: &str| order.order.iter().position(|item| item == name);
        assert!(position("b") < position("aa_child"));
        assert!(position("a") < position("aa_child"));
        assert!(position("root") < position("x"));
        assert!(position("y") < position("z_leaf"));
        assert_eq!(order.order.len(), 7);
    }

    #[test]
    fn separate_cycles_are_both_reported() {
        let schema = schema(vec![
            table("a", vec![fk("b_id", "b")]),
            table("b", vec![fk("a_id", "a")]),
            table("p", vec![fk("q_id", "q"), fk("a_id", "a")]),
            table("q", vec![fk("p_id", "p")]),
        ]);

        let order = dependency_order(&schema);
        assert_eq!(order.order, vec!["a", "b", "p", "q"]);
        assert_eq!(
            order.cycle,
            Some(vec!["a".into(), "b".into(), "p".into(), "q".into()])
        );
    }

    #[test]
    fn references_outside_schema_are_ignored() {
        let schema = schema(vec![table("permissions", vec![fk("content_type_id", "content_types")])]);

        let order = dependency_order(&schema);
        assert_eq!(order.order, vec!["permissions".to_string()]);
    }

    #[test]
    fn ties_break_by_name() {
        let schema = schema(vec![
            table("zeta", Vec::new()),
            table("alpha", Vec::new()),
            table("mid", vec![fk("alpha_id", "alpha")]),
        ]);

        let order = dependency_order(&schema);
        assert_eq!(order.order, vec!["alpha", "mid", "zeta"]);
    }
}
