use std::fmt::Write;

use thiserror::Error;
use tracing::{debug, trace};

use crate::compile::{
    ir::{FuncDef, Inst},
    semantic::types::Type,
};

use ctype::{TypeCollector, c_type, declarator, mangle, value_tags};
use expr::CWriter;

pub mod cc;
pub mod ctype;
pub mod defer;
pub mod expr;

#[derive(Error, Debug)]
pub enum LoweringError {
    #[error("malformed IR: {0}")]
    MalformedIr(String),

    #[error("could not format C output")]
    Fmt(#[from] std::fmt::Error),
}

/// Functions whose prototypes come with the standard includes.
const PROVIDED_BY_INCLUDES: &[&str] = &[
    "printf", "fprintf", "sprintf", "snprintf", "puts", "putchar", "fputs", "getchar",
    "scanf", "fflush", "fopen", "fclose",
];

const INCLUDES: &[&str] = &["stdint.h", "stddef.h", "stdio.h"];

/// Renders a whole program as one C translation unit.
pub fn generate(program: Vec<Inst>) -> Result<String, LoweringError> {
    let mut errors = Vec::new();
    let mut types = Vec::new();
    let mut globals = Vec::new();
    let mut functions = Vec::new();

    for inst in program {
        match inst {
            Inst::ErrorDecl { .. } => errors.push(inst),
            Inst::StructDecl { .. } | Inst::EnumDecl { .. } => types.push(inst),
            Inst::VarDecl(_) => globals.push(inst),
            Inst::FuncDef(def) => functions.push(defer::lower_function(def)?),
            other => {
                return Err(LoweringError::MalformedIr(format!(
                    "{} at file scope",
                    other.kind()
                )));
            }
        }
    }

    let mut collector = TypeCollector::default();
    for inst in types.iter().chain(globals.iter()) {
        collect_types(inst, &mut collector);
    }
    for def in functions.iter() {
        collector.visit(&def.return_type);
        def.params
            .iter()
            .filter_map(|param| param.ty.as_ref())
            .for_each(|ty| collector.visit(ty));
        def.body.iter().for_each(|inst| collect_types(inst, &mut collector));
    }
    debug!(
        "emitting {} tuple and {} error union struct(s)",
        collector.tuples.len(),
        collector.error_unions.len()
    );

    let file = CWriter::file_scope();
    let mut c = String::new();

    for include in INCLUDES.iter() {
        writeln!(&mut c, "#include <{include}>")?;
    }
    writeln!(&mut c)?;

    writeln!(&mut c, "struct slice {{ void* ptr; size_t len; }};")?;
    writeln!(&mut c, "struct interface {{ void* vtable; void* data; }};")?;
    writeln!(&mut c)?;

    for inst in errors.iter() {
        if let Inst::ErrorDecl { name, code } = inst {
            writeln!(&mut c, "#define ERROR_{name} {code}U")?;
        }
    }
    if !errors.is_empty() {
        writeln!(&mut c)?;
    }

    for inst in types.iter() {
        if let Inst::EnumDecl { name, variants } = inst {
            let variants = variants
                .iter()
                .map(|(variant, value)| match value {
                    Some(value) => Ok(format!("{name}_{variant} = {}", file.expr(value)?)),
                    None => Ok(format!("{name}_{variant}")),
                })
                .collect::<Result<Vec<_>, LoweringError>>()?;
            writeln!(&mut c, "enum {name} {{ {} }};", variants.join(", "))?;
        }
    }

    let shapes = struct_shapes(&types, &collector)?;
    let mut written = vec![Visit::Pending; shapes.len()];
    for idx in 0..shapes.len() {
        write_shape(&mut c, &shapes, idx, &mut written)?;
    }
    writeln!(&mut c)?;

    for inst in globals.iter() {
        if let Inst::VarDecl(decl) = inst {
            writeln!(&mut c, "{};", file.var_decl(decl)?)?;
        }
    }
    if !globals.is_empty() {
        writeln!(&mut c)?;
    }

    for def in functions.iter() {
        let provided = def.is_extern && PROVIDED_BY_INCLUDES.contains(&def.name.as_str());
        if !provided {
            writeln!(&mut c, "{};", signature(def)?)?;
        }
    }
    writeln!(&mut c)?;

    for def in functions.iter().filter(|def| !def.is_extern) {
        trace!("writing `{}`", def.name);

        writeln!(&mut c, "{} {{", signature(def)?)?;
        CWriter::in_function(&def.name).stmts(&mut c, &def.body, 1)?;
        writeln!(&mut c, "}}")?;
        writeln!(&mut c)?;
    }

    Ok(c)
}

/// A C struct definition: user structs, tuples and error unions alike.
#[derive(Debug)]
struct StructShape {
    tag: String,
    fields: Vec<(String, Type)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Visit {
    Pending,
    Active,
    Written,
}

fn struct_shapes(types: &[Inst], collector: &TypeCollector) -> Result<Vec<StructShape>, LoweringError> {
    let mut shapes = Vec::new();

    for inst in types.iter() {
        if let Inst::StructDecl { name, fields } = inst {
            shapes.push(StructShape {
                tag: name.clone(),
                fields: fields.clone(),
            });
        }
    }

    for items in collector.tuples.iter() {
        shapes.push(StructShape {
            tag: mangle(&Type::Tuple(items.clone()))?,
            fields: items
                .iter()
                .enumerate()
                .map(|(idx, item)| (format!("_{idx}"), item.clone()))
                .collect(),
        });
    }

    for payload in collector.error_unions.iter() {
        let mut fields = vec![("error_id".to_string(), Type::U32)];
        if !payload.is_void() {
            fields.push(("value".to_string(), payload.clone()));
        }

        shapes.push(StructShape {
            tag: mangle(&Type::ErrorUnion(Box::new(payload.clone())))?,
            fields,
        });
    }

    Ok(shapes)
}

/// Writes `shapes[idx]` after every struct it holds by value.
fn write_shape(
    c: &mut String,
    shapes: &[StructShape],
    idx: usize,
    written: &mut [Visit],
) -> Result<(), LoweringError> {
    match written[idx] {
        Visit::Written => return Ok(()),
        Visit::Active => {
            return Err(LoweringError::MalformedIr(format!(
                "struct `{}` contains itself",
                shapes[idx].tag
            )));
        }
        Visit::Pending => {}
    }
    written[idx] = Visit::Active;

    let shape = &shapes[idx];
    for (_, ty) in shape.fields.iter() {
        for tag in value_tags(ty)? {
            if let Some(dep) = shapes.iter().position(|other| other.tag == tag) {
                write_shape(c, shapes, dep, written)?;
            }
        }
    }

    writeln!(c, "struct {} {{", shape.tag)?;
    for (field, ty) in shape.fields.iter() {
        writeln!(c, "    {};", declarator(ty, field)?)?;
    }
    writeln!(c, "}};")?;

    written[idx] = Visit::Written;
    Ok(())
}

fn signature(def: &FuncDef) -> Result<String, LoweringError> {
    let mut params = def
        .params
        .iter()
        .map(|param| match &param.ty {
            Some(ty) => declarator(ty, &param.name),
            None => Err(LoweringError::MalformedIr(format!(
                "parameter `{}` of `{}` has no type",
                param.name, def.name
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if def.has_varargs {
        params.push("...".to_string());
    }
    if params.is_empty() {
        params.push("void".to_string());
    }

    Ok(format!(
        "{} {}({})",
        c_type(&def.return_type)?,
        def.name,
        params.join(", ")
    ))
}

fn collect_types(inst: &Inst, collector: &mut TypeCollector) {
    match inst {
        Inst::VarDecl(decl) => {
            if let Some(ty) = &decl.ty {
                collector.visit(ty);
            }
        }
        Inst::TupleInit { ty: Some(ty), .. } => collector.visit(ty),
        Inst::ErrorUnionInit { payload, .. } => {
            collector.visit(&Type::ErrorUnion(Box::new(payload.clone())))
        }
        Inst::StructDecl { fields, .. } => fields.iter().for_each(|(_, ty)| collector.visit(ty)),
        _ => {}
    }

    for child in inst.children() {
        collect_types(child, collector);
    }
}

#[cfg(test)]
mod tests {
    use super::generate;
    use crate::compile::{
        ir::{FuncDef, Inst, VarDecl},
        semantic::types::Type,
    };

    fn function(name: &str, return_type: Type, body: Vec<Inst>) -> Inst {
        Inst::FuncDef(FuncDef {
            name: name.to_string(),
            params: Vec::new(),
            return_type,
            body,
            is_extern: false,
            has_varargs: false,
        })
    }

    #[test]
    fn sections_come_in_order() {
        let program = vec![
            Inst::ErrorDecl {
                name: "Oops".to_string(),
                code: 2480197,
            },
            Inst::StructDecl {
                name: "Point".to_string(),
                fields: vec![("x".to_string(), Type::I32)],
            },
            Inst::VarDecl(VarDecl {
                name: "LIMIT".to_string(),
                ty: Some(Type::I32),
                value: Some(Inst::int("10").boxed()),
                is_const: true,
            }),
            function(
                "f",
                Type::ErrorUnion(Box::new(Type::I32)),
                vec![Inst::Return {
                    value: Some(Inst::int("1").boxed()),
                    forward: false,
                }],
            ),
        ];

        let c = generate(program).unwrap();
        let position = |needle: &str| c.find(needle).unwrap_or_else(|| panic!("`{needle}` missing in\n{c}"));

        assert!(position("#include <stdint.h>") < position("struct slice"));
        assert!(position("struct interface") < position("#define ERROR_Oops 2480197U"));
        assert!(position("#define ERROR_Oops") < position("struct Point {"));
        assert!(position("struct Point {") < position("struct error_union_i32 {"));
        assert!(position("struct error_union_i32 {") < position("const int32_t LIMIT = 10;"));
        assert!(position("const int32_t LIMIT") < position("struct error_union_i32 f(void);"));
        assert!(position("struct error_union_i32 f(void);") < position("struct error_union_i32 f(void) {"));
        assert_eq!(c.matches("struct slice {").count(), 1);
    }

    #[test]
    fn externs_from_stdio_are_not_redeclared() {
        let externs = ["printf", "abs"].map(|name| {
            Inst::FuncDef(FuncDef {
                name: name.to_string(),
                params: vec![VarDecl {
                    name: "x".to_string(),
                    ty: Some(Type::I32),
                    value: None,
                    is_const: false,
                }],
                return_type: Type::I32,
                body: Vec::new(),
                is_extern: true,
                has_varargs: name == "printf",
            })
        });

        let c = generate(externs.to_vec()).unwrap();
        assert!(!c.contains("printf("));
        assert!(c.contains("int32_t abs(int32_t x);"));
    }

    #[test]
    fn void_payloads_have_no_value_field() {
        let c = generate(vec![function("f", Type::ErrorUnion(Box::new(Type::Void)), Vec::new())]).unwrap();
        assert!(c.contains("struct error_union_void {\n    uint32_t error_id;\n};"));
    }

    #[test]
    fn structs_follow_the_shapes_they_contain() {
        let pair = Type::Tuple(vec![Type::I32, Type::I32]);
        let program = vec![
            Inst::StructDecl {
                name: "Outer".to_string(),
                fields: vec![("inner".to_string(), Type::Struct("Inner".to_string()))],
            },
            Inst::StructDecl {
                name: "Inner".to_string(),
                fields: vec![
                    ("t".to_string(), pair.clone()),
                    ("r".to_string(), Type::ErrorUnion(Box::new(pair))),
                ],
            },
        ];

        let c = generate(program).unwrap();
        let position = |needle: &str| c.find(needle).unwrap_or_else(|| panic!("`{needle}` missing in\n{c}"));

        assert!(position("struct tuple_i32_i32 {") < position("struct error_union_tuple_i32_i32 {"));
        assert!(position("struct error_union_tuple_i32_i32 {") < position("struct Inner {"));
        assert!(position("struct Inner {") < position("struct Outer {"));
        assert_eq!(c.matches("struct tuple_i32_i32 {").count(), 1);
    }

    #[test]
    fn self_containing_structs_are_malformed() {
        let program = vec![Inst::StructDecl {
            name: "Loop".to_string(),
            fields: vec![("next".to_string(), Type::Struct("Loop".to_string()))],
        }];

        assert!(generate(program).is_err());
    }

    #[test]
    fn file_scope_statements_are_malformed() {
        assert!(generate(vec![Inst::Break]).is_err());
    }
}
