use std::sync::Arc;

use smol_str::SmolStr;
use warren_lib_core::entry::{Entry, apply_modifications};
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::schema::Registries;

use crate::chain::{Interceptor, Next, SchemaRef};
use crate::context::{AddContext, ModifyContext};
use crate::nexus::PartitionNexus;

/// Entry-shape validation against the schema: object classes resolve,
/// required attributes are present, single-valued types hold one value,
/// and nobody writes what only the engine may write.
#[derive(Debug)]
pub struct SchemaInterceptor {
    schema: SchemaRef,
    nexus: Arc<PartitionNexus>,
}

impl SchemaInterceptor {
    pub fn new(schema: SchemaRef, nexus: Arc<PartitionNexus>) -> Self {
        Self { schema, nexus }
    }
}

impl Interceptor for SchemaInterceptor {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        let schema = self.schema.current();
        // The RDN invariant has to hold before required-attribute checks can
        // be meaningful.
        ctx.entry.inject_rdn_attributes(&schema)?;
        expand_object_classes(&schema, &mut ctx.entry)?;
        validate_entry(&schema, &ctx.entry)?;
        next.add(ctx)
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        let schema = self.schema.current();

        if !ctx.state.internal {
            for modification in &ctx.mods {
                let attr_type = schema.attribute_type(&modification.attr)?;
                if attr_type.no_user_modification {
                    return Err(OperationError::new(
                        LdapErrorKind::SchemaViolation,
                        format!("{} may only be maintained by the server", modification.attr),
                    ));
                }
            }
        }

        // Dry-run the modifications on a copy so an invalid result never
        // reaches storage.
        if let Ok(partition) = self.nexus.find_partition(&ctx.dn)
            && let Some(mut copy) = partition.lookup(&ctx.dn)
        {
            apply_modifications(&schema, &mut copy, &ctx.mods)?;
            validate_entry(&schema, &copy)?;
        }

        next.modify(ctx)
    }
}

/// Completes the `objectClass` attribute with every inherited superclass,
/// so class filters hit entries of derived classes the way clients expect.
fn expand_object_classes(schema: &Registries, entry: &mut Entry) -> OpResult<()> {
    let mut pending: Vec<SmolStr> = entry
        .object_classes()
        .iter()
        .map(|c| SmolStr::from(*c))
        .collect();
    let mut closure: Vec<SmolStr> = Vec::new();
    while let Some(name) = pending.pop() {
        let Ok(class) = schema.object_class(&name) else {
            continue; // validation right after reports the real error
        };
        if closure.contains(&class.oid) {
            continue;
        }
        closure.push(class.oid.clone());
        pending.extend(class.superior.iter().cloned());
        entry.add_str(schema, "objectClass", class.preferred_name())?;
    }
    Ok(())
}

/// The invariants every stored entry satisfies: a defined object class for
/// every listed value, required attributes of the whole superclass closure
/// present, and single-value constraints respected.
fn validate_entry(schema: &Registries, entry: &Entry) -> OpResult<()> {
    let classes = entry.object_classes();
    if classes.is_empty() {
        return Err(violation(format!(
            "{} has no objectClass attribute",
            entry.dn()
        )));
    }

    // Walk the closure of listed classes and their superiors.
    let mut pending: Vec<SmolStr> = classes.iter().map(|c| SmolStr::from(*c)).collect();
    let mut seen: Vec<SmolStr> = Vec::new();
    while let Some(name) = pending.pop() {
        let class = schema.object_class(&name).map_err(|_| {
            violation(format!("{} lists undefined object class {name}", entry.dn()))
        })?;
        if seen.contains(&class.oid) {
            continue;
        }
        seen.push(class.oid.clone());
        pending.extend(class.superior.iter().cloned());

        for must in &class.must {
            let attr_type = schema.attribute_type(must)?;
            if !entry.has_attribute(&attr_type.oid) {
                return Err(violation(format!(
                    "{} misses required attribute {must} of object class {}",
                    entry.dn(),
                    class.preferred_name()
                )));
            }
        }
    }

    for attribute in entry.attributes() {
        let attr_type = attribute.attr_type();
        if attr_type.single_value && attribute.len() > 1 {
            return Err(OperationError::new(
                LdapErrorKind::InvalidAttributeSyntax,
                format!(
                    "{} holds {} values of single-valued {}",
                    entry.dn(),
                    attribute.len(),
                    attr_type.preferred_name()
                ),
            ));
        }
    }

    Ok(())
}

fn violation(message: String) -> OperationError {
    OperationError::new(LdapErrorKind::ObjectClassViolation, message)
}
