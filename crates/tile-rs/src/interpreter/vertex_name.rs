//! Kernel names with template arguments, e.g. `popops::BinaryOp1D<popops::expr::BinaryOpType::ADD,float>`.

use std::fmt;

use crate::error::{TileError, TileResult};
use crate::types::IpuType;

/// One template argument of a kernel name.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateArg {
    Name(String),
    Bool(bool),
    Int(i64),
    Type(IpuType),
}

impl fmt::Display for TemplateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateArg::Name(name) => f.write_str(name),
            TemplateArg::Bool(value) => write!(f, "{value}"),
            TemplateArg::Int(value) => write!(f, "{value}"),
            TemplateArg::Type(dtype) => f.write_str(dtype.template_name()),
        }
    }
}

impl From<&str> for TemplateArg {
    fn from(value: &str) -> Self {
        TemplateArg::Name(value.to_string())
    }
}

impl From<String> for TemplateArg {
    fn from(value: String) -> Self {
        TemplateArg::Name(value)
    }
}

impl From<bool> for TemplateArg {
    fn from(value: bool) -> Self {
        TemplateArg::Bool(value)
    }
}

impl From<i64> for TemplateArg {
    fn from(value: i64) -> Self {
        TemplateArg::Int(value)
    }
}

impl From<IpuType> for TemplateArg {
    fn from(value: IpuType) -> Self {
        TemplateArg::Type(value)
    }
}

/// `basename<arg0,arg1,...>`, or `basename` alone without arguments.
pub fn make_vertex_name_templated(basename: &str, args: &[TemplateArg]) -> String {
    if args.is_empty() {
        return basename.to_string();
    }
    let args: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("{basename}<{}>", args.join(","))
}

/// Splits a kernel name into its basename and top-level template arguments.
pub fn parse_vertex_name(name: &str) -> TileResult<(String, Vec<String>)> {
    let malformed = || TileError::design(format!("malformed kernel name '{name}'"));
    let Some(open) = name.find('<') else {
        if name.contains('>') {
            return Err(malformed());
        }
        return Ok((name.trim().to_string(), Vec::new()));
    };
    let body = name[open + 1..].strip_suffix('>').ok_or_else(malformed)?;

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (pos, ch) in body.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1).ok_or_else(malformed)?,
            ',' if depth == 0 => {
                args.push(body[start..pos].trim().to_string());
                start = pos + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(malformed());
    }
    args.push(body[start..].trim().to_string());
    Ok((name[..open].trim().to_string(), args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templated_names_render_like_kernel_sources() {
        let name = make_vertex_name_templated(
            "popops::ScaledAddSupervisor",
            &[
                IpuType::Half.into(),
                IpuType::Half.into(),
                IpuType::Half.into(),
                false.into(),
            ],
        );
        assert_eq!(name, "popops::ScaledAddSupervisor<half,half,half,false>");
        assert_eq!(make_vertex_name_templated("Plain", &[]), "Plain");
        assert_eq!(
            make_vertex_name_templated("K", &[TemplateArg::Int(-3), IpuType::UnsignedInt.into()]),
            "K<-3,unsigned int>"
        );
    }

    #[test]
    fn parse_keeps_nested_arguments_whole() {
        let (base, args) = parse_vertex_name("Outer<Inner<int,float>,unsigned short>").unwrap();
        assert_eq!(base, "Outer");
        assert_eq!(args, vec!["Inner<int,float>", "unsigned short"]);

        let (base, args) = parse_vertex_name("TileDataBarrierVertex").unwrap();
        assert_eq!(base, "TileDataBarrierVertex");
        assert!(args.is_empty());

        assert!(parse_vertex_name("Broken<int").is_err());
        assert!(parse_vertex_name("Broken<int>>").is_err());
    }
}
