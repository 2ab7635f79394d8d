//! API Calls and Arguments
//!
//! An API group owns a set of intercepted calls; each call carries an ordered
//! argument list plus the flags that steer where its events travel in the
//! overlay (upward by default, sideways for wrap-across, toward the
//! application for wrap-down).

use crate::error::{Result, WeaverError};
use crate::spec::{ApiGroupId, OperationId};

/// Usage intent of a call argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentIntent {
    In,
    Out,
    InOut,
}

impl ArgumentIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgumentIntent::In => "in",
            ArgumentIntent::Out => "out",
            ArgumentIntent::InOut => "inout",
        }
    }
}

/// Where an array argument's element count comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayLength {
    /// Another (scalar) argument of the same call, referenced by name
    Argument(String),
    /// An operation mapped to the same call; `use_array_len` selects the
    /// operation's length value instead of its return value
    Operation {
        op: OperationId,
        mapping_id: i32,
        use_array_len: bool,
    },
}

/// One argument of an intercepted call
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub type_name: String,
    pub intent: ArgumentIntent,
    /// Type suffix that belongs after the name in a declaration,
    /// e.g. the `[3]` in `int array[3]`
    pub type_after_arg: Option<String>,
    /// `None` for scalars
    pub length: Option<ArrayLength>,
}

impl Argument {
    pub fn scalar(
        name: impl Into<String>,
        type_name: impl Into<String>,
        intent: ArgumentIntent,
    ) -> Self {
        Argument {
            name: name.into(),
            type_name: type_name.into(),
            intent,
            type_after_arg: None,
            length: None,
        }
    }

    pub fn array_with_length_arg(
        name: impl Into<String>,
        type_name: impl Into<String>,
        intent: ArgumentIntent,
        length_arg: impl Into<String>,
    ) -> Self {
        Argument {
            name: name.into(),
            type_name: type_name.into(),
            intent,
            type_after_arg: None,
            length: Some(ArrayLength::Argument(length_arg.into())),
        }
    }

    pub fn array_with_length_op(
        name: impl Into<String>,
        type_name: impl Into<String>,
        intent: ArgumentIntent,
        op: OperationId,
        mapping_id: i32,
        use_array_len: bool,
    ) -> Self {
        Argument {
            name: name.into(),
            type_name: type_name.into(),
            intent,
            type_after_arg: None,
            length: Some(ArrayLength::Operation {
                op,
                mapping_id,
                use_array_len,
            }),
        }
    }

    pub fn is_array(&self) -> bool {
        self.length.is_some()
    }
}

/// Behavioral flags of an API call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFlags {
    /// Wrapped on the application processes and on every tool layer
    pub wrapped_everywhere: bool,
    /// Event travels sideways within the creating layer
    pub wrap_across: bool,
    /// Event travels toward the application instead of toward the root
    pub wrap_down: bool,
    /// Starts the shutdown of the whole tool
    pub is_finalizer: bool,
    /// Shuts down only the module associated with the wrapper
    pub is_local_finalizer: bool,
    /// The notification that actually shuts down a layer it arrives at
    pub is_notify_finalize: bool,
    /// Must be processed out of order
    pub is_out_of_order: bool,
    pub is_callback: bool,
    pub is_hook: bool,
}

/// One intercepted API call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub name: String,
    pub group: ApiGroupId,
    pub return_type: String,
    pub arguments: Vec<Argument>,
    pub flags: CallFlags,
    /// Globally unique small integer, assigned at registration; used for
    /// call-id inputs and record dispatch
    pub unique_id: u32,
}

impl ApiCall {
    pub fn new(
        name: impl Into<String>,
        group: ApiGroupId,
        return_type: impl Into<String>,
        flags: CallFlags,
        unique_id: u32,
    ) -> Result<Self> {
        if flags.wrap_across && flags.wrap_down {
            return Err(WeaverError::constraint(format!(
                "call '{}' sets both wrap-across and wrap-down",
                name.into()
            )));
        }
        Ok(ApiCall {
            name: name.into(),
            group,
            return_type: return_type.into(),
            arguments: Vec::new(),
            flags,
            unique_id,
        })
    }

    /// Append an argument; its position becomes the argument index.
    ///
    /// A length-argument reference must name a scalar argument that is
    /// already part of the call.
    pub fn add_argument(&mut self, argument: Argument) -> Result<()> {
        if self.find_argument(&argument.name).is_some() {
            return Err(WeaverError::constraint(format!(
                "call '{}' already has an argument '{}'",
                self.name, argument.name
            )));
        }
        if let Some(ArrayLength::Argument(len_name)) = &argument.length {
            match self.find_argument(len_name) {
                Some((_, len_arg)) if !len_arg.is_array() => {}
                Some(_) => {
                    return Err(WeaverError::constraint(format!(
                        "length argument '{}' of '{}.{}' must be a scalar",
                        len_name, self.name, argument.name
                    )))
                }
                None => {
                    return Err(WeaverError::unresolved("length argument", len_name.clone()))
                }
            }
        }
        self.arguments.push(argument);
        Ok(())
    }

    /// Look up an argument by name together with its index
    pub fn find_argument(&self, name: &str) -> Option<(usize, &Argument)> {
        self.arguments
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == name)
    }
}

/// A named group of API calls (one intercepted API)
#[derive(Debug, Clone, Default)]
pub struct ApiGroup {
    pub name: String,
    /// Header that declares the wrapped API
    pub api_header: Option<String>,
    pub calls: Vec<crate::spec::CallId>,
}

impl ApiGroup {
    pub fn new(name: impl Into<String>, api_header: Option<String>) -> Self {
        ApiGroup {
            name: name.into(),
            api_header,
            calls: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ApiGroupId;

    fn call() -> ApiCall {
        ApiCall::new("Send", ApiGroupId(0), "int", CallFlags::default(), 0).unwrap()
    }

    #[test]
    fn wrap_across_and_down_are_exclusive() {
        let flags = CallFlags {
            wrap_across: true,
            wrap_down: true,
            ..CallFlags::default()
        };
        assert!(ApiCall::new("Bad", ApiGroupId(0), "void", flags, 1).is_err());
    }

    #[test]
    fn length_argument_must_exist_and_be_scalar() {
        let mut c = call();
        assert!(c
            .add_argument(Argument::array_with_length_arg(
                "counts",
                "int*",
                ArgumentIntent::In,
                "size",
            ))
            .is_err());

        c.add_argument(Argument::scalar("size", "int", ArgumentIntent::In))
            .unwrap();
        assert!(c
            .add_argument(Argument::array_with_length_arg(
                "counts",
                "int*",
                ArgumentIntent::In,
                "size",
            ))
            .is_ok());
    }

    #[test]
    fn duplicate_argument_rejected() {
        let mut c = call();
        c.add_argument(Argument::scalar("dest", "int", ArgumentIntent::In))
            .unwrap();
        assert!(c
            .add_argument(Argument::scalar("dest", "int", ArgumentIntent::In))
            .is_err());
    }
}
