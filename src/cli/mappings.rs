//! Look up names across namespaces.
//!
//! ```bash
//! oldloom mappings Entity
//! oldloom mappings field_70165_t
//! oldloom mappings posX --namespace named
//! ```
//!
//! A query matches a class by its full internal name or its simple name, and a member by
//! its name. Each hit prints the official, intermediary and named forms.

use crate::cli::common::{CommandContext, GlobalOptions};
use crate::mappings::{MappingSet, Names, Namespace};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Look up a class or member name.
#[derive(Args, Debug)]
pub struct MappingsCommand {
    /// Class name (full or simple) or member name
    query: String,

    /// Only match names in this namespace (official, intermediary/srg, named/mcp)
    #[arg(short, long)]
    namespace: Option<Namespace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitKind {
    Class,
    Field,
    Method,
}

#[derive(Debug)]
struct Hit<'a> {
    kind: HitKind,
    owner: Option<&'a Names>,
    names: &'a Names,
    descriptor: Option<&'a str>,
}

impl MappingsCommand {
    pub fn execute(self, options: &GlobalOptions) -> Result<()> {
        let context = CommandContext::load(options)?;
        let pipeline = context.pipeline()?;
        pipeline.reach(pipeline.mappings)?;
        let provider = pipeline.graph.get(pipeline.mappings)?;
        let set = provider.mappings()?;

        let hits = lookup(set, &self.query, self.namespace);
        if hits.is_empty() {
            println!("{} No mapping matches '{}'", "!".yellow(), self.query);
            return Ok(());
        }
        for hit in &hits {
            print_hit(hit);
        }
        println!("{} match(es) in mappings {}", hits.len(), provider.id().dimmed());
        Ok(())
    }
}

fn matches(names: &Names, query: &str, namespace: Option<Namespace>, simple: bool) -> bool {
    let namespaces: &[Namespace] = match &namespace {
        Some(namespace) => std::slice::from_ref(namespace),
        None => &Namespace::ALL,
    };
    namespaces.iter().any(|ns| {
        names.exact(*ns).is_some_and(|name| {
            name == query || (simple && name.rsplit('/').next() == Some(query))
        })
    })
}

fn lookup<'a>(set: &'a MappingSet, query: &str, namespace: Option<Namespace>) -> Vec<Hit<'a>> {
    let query = query.replace('.', "/");
    let mut hits = Vec::new();
    for class in set.classes() {
        if matches(&class.names, &query, namespace, true) {
            hits.push(Hit {
                kind: HitKind::Class,
                owner: None,
                names: &class.names,
                descriptor: None,
            });
        }
        let fields = class.fields().map(|member| (HitKind::Field, member));
        let methods = class.methods().map(|member| (HitKind::Method, member));
        for (kind, member) in fields.chain(methods) {
            if matches(&member.names, &query, namespace, false) {
                hits.push(Hit {
                    kind,
                    owner: Some(&class.names),
                    names: &member.names,
                    descriptor: member.descriptor.as_deref(),
                });
            }
        }
    }
    hits
}

fn print_hit(hit: &Hit<'_>) {
    let label = match hit.kind {
        HitKind::Class => "class".green(),
        HitKind::Field => "field".cyan(),
        HitKind::Method => "method".magenta(),
    };
    match hit.owner {
        Some(owner) => println!(
            "{label} {}.{}{}",
            owner.get(Namespace::Named),
            hit.names.get(Namespace::Named).bold(),
            hit.descriptor.map(|d| format!(" {d}")).unwrap_or_default().dimmed()
        ),
        None => println!("{label} {}", hit.names.get(Namespace::Named).bold()),
    }
    for namespace in Namespace::ALL {
        println!("  {:<13} {}", namespace.as_str(), hit.names.get(namespace));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MappingSet {
        let mut set = MappingSet::new();
        let class = set.class_mut("sa");
        class.names.set(Namespace::Intermediary, "net/minecraft/src/Entity");
        class.names.set(Namespace::Named, "net/minecraft/entity/Entity");
        let field = class.field_mut("t", Some("D"));
        field.names.set(Namespace::Intermediary, "field_70165_t");
        field.names.set(Namespace::Named, "posX");
        class.method_mut("a", "()V").names.set(Namespace::Intermediary, "func_70071_h_");
        set
    }

    #[test]
    fn test_simple_class_name_matches_every_namespace() {
        let set = sample();
        let hits = lookup(&set, "Entity", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, HitKind::Class);
        assert_eq!(hits[0].names.official(), "sa");
    }

    #[test]
    fn test_member_lookup_and_namespace_filter() {
        let set = sample();
        let hits = lookup(&set, "posX", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, HitKind::Field);
        assert_eq!(hits[0].owner.unwrap().official(), "sa");

        assert!(lookup(&set, "posX", Some(Namespace::Intermediary)).is_empty());
        let method = lookup(&set, "func_70071_h_", Some(Namespace::Intermediary));
        assert_eq!(method[0].kind, HitKind::Method);
        assert_eq!(method[0].names.get(Namespace::Named), "func_70071_h_");
    }

    #[test]
    fn test_dotted_class_names_are_accepted() {
        let set = sample();
        assert_eq!(lookup(&set, "net.minecraft.entity.Entity", None).len(), 1);
    }
}
