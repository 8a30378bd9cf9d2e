//! Role and block scopes.

use crate::combinator::{TemplateFactory, create_new_context};
use crate::context::{Context, ContextPatch};
use crate::element::Role;

fn role_scope(role: Role) -> TemplateFactory {
    create_new_context(move |_| ContextPatch::new().role(role))
}

/// Templates spoken by the system.
pub fn system() -> TemplateFactory {
    role_scope(Role::System)
}

/// Templates spoken by the user.
pub fn user() -> TemplateFactory {
    role_scope(Role::User)
}

/// Templates spoken by the assistant.
pub fn assistant() -> TemplateFactory {
    role_scope(Role::Assistant)
}

/// Templates whose outputs are grouped under `name`.
pub fn block(name: impl Into<String>) -> TemplateFactory {
    let name = name.into();
    create_new_context(move |ctx: &Context| {
        ContextPatch::new().output_address(ctx.address_with([name.as_str()]))
    })
}
