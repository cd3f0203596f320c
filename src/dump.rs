// File: src/dump.rs
//
// Neutral on-disk form for a compiled `CodeProgram` (`lucy dump`/bytecode
// caching). JSON via `serde_json`, grounded on the reference dumper's tagged
// `["function", {...}]` / `["global_reference", {}]` constant encoding —
// everything else in the constant pool round-trips as a bare JSON scalar.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::bytecode::{CodeProgram, Const, FunctionConst, OpCode};
use crate::errors::{ErrorKind, LucyError, SourceLocation};

#[derive(Serialize, Deserialize)]
struct DumpedProgram {
    code: Vec<(String, Option<usize>)>,
    const_pool: Vec<Json>,
    name_pool: Vec<String>,
}

fn dump_error(message: impl Into<String>) -> LucyError {
    LucyError::new(ErrorKind::ImportError, message.into(), SourceLocation::unknown())
}

fn dump_op(op: &OpCode) -> (String, Option<usize>) {
    let arg = match op {
        OpCode::Pop
        | OpCode::Dup
        | OpCode::DupTwo
        | OpCode::RotTwo
        | OpCode::GetAttr
        | OpCode::GetItem
        | OpCode::SetAttr
        | OpCode::SetItem
        | OpCode::Neg
        | OpCode::Not
        | OpCode::Add
        | OpCode::Sub
        | OpCode::Mul
        | OpCode::Div
        | OpCode::Mod
        | OpCode::Is
        | OpCode::GetLen
        | OpCode::Return
        | OpCode::ImportStar => None,
        OpCode::LoadConst(n)
        | OpCode::LoadName(n)
        | OpCode::Store(n)
        | OpCode::Global(n)
        | OpCode::BuildTable(n)
        | OpCode::For(n)
        | OpCode::Jump(n)
        | OpCode::JumpIfTrue(n)
        | OpCode::JumpIfFalse(n)
        | OpCode::JumpIfTrueOrPop(n)
        | OpCode::JumpIfFalseOrPop(n)
        | OpCode::Call(n)
        | OpCode::Goto(n)
        | OpCode::Import(n)
        | OpCode::ImportFrom(n) => Some(*n),
        OpCode::CompareOp(code) => Some(*code as usize),
    };
    (op.name().to_string(), arg)
}

fn load_op(name: &str, arg: Option<usize>) -> Result<OpCode, LucyError> {
    let need = |name: &str| arg.ok_or_else(|| dump_error(format!("opcode '{name}' requires an argument")));
    Ok(match name {
        "POP" => OpCode::Pop,
        "DUP" => OpCode::Dup,
        "DUP_TWO" => OpCode::DupTwo,
        "ROT_TWO" => OpCode::RotTwo,
        "GET_ATTR" => OpCode::GetAttr,
        "GET_ITEM" => OpCode::GetItem,
        "SET_ATTR" => OpCode::SetAttr,
        "SET_ITEM" => OpCode::SetItem,
        "NEG" => OpCode::Neg,
        "NOT" => OpCode::Not,
        "ADD" => OpCode::Add,
        "SUB" => OpCode::Sub,
        "MUL" => OpCode::Mul,
        "DIV" => OpCode::Div,
        "MOD" => OpCode::Mod,
        "IS" => OpCode::Is,
        "GET_LEN" => OpCode::GetLen,
        "RETURN" => OpCode::Return,
        "IMPORT_STAR" => OpCode::ImportStar,
        "LOAD_CONST" => OpCode::LoadConst(need(name)?),
        "LOAD_NAME" => OpCode::LoadName(need(name)?),
        "STORE" => OpCode::Store(need(name)?),
        "GLOBAL" => OpCode::Global(need(name)?),
        "BUILD_TABLE" => OpCode::BuildTable(need(name)?),
        "FOR" => OpCode::For(need(name)?),
        "JUMP" => OpCode::Jump(need(name)?),
        "JUMP_IF_TRUE" => OpCode::JumpIfTrue(need(name)?),
        "JUMP_IF_FALSE" => OpCode::JumpIfFalse(need(name)?),
        "JUMP_IF_TRUE_OR_POP" => OpCode::JumpIfTrueOrPop(need(name)?),
        "JUMP_IF_FALSE_OR_POP" => OpCode::JumpIfFalseOrPop(need(name)?),
        "CALL" => OpCode::Call(need(name)?),
        "GOTO" => OpCode::Goto(need(name)?),
        "IMPORT" => OpCode::Import(need(name)?),
        "IMPORT_FROM" => OpCode::ImportFrom(need(name)?),
        "COMPARE_OP" => OpCode::CompareOp(need(name)? as u8),
        other => return Err(dump_error(format!("unknown opcode '{other}'"))),
    })
}

fn dump_const(c: &Const) -> Json {
    match c {
        Const::Null => Json::Null,
        Const::Bool(b) => Json::Bool(*b),
        Const::Int(i) => Json::from(*i),
        Const::Float(f) => Json::from(*f),
        Const::String(s) => Json::String(s.clone()),
        Const::GlobalReference => Json::from(vec![Json::String("global_reference".to_string()), Json::Object(Default::default())]),
        Const::Function(fc) => Json::from(vec![
            Json::String("function".to_string()),
            serde_json::json!({
                "params_num": fc.params_num,
                "address": fc.address,
                "is_closure": fc.is_closure,
                "extend": fc.extend,
            }),
        ]),
    }
}

fn load_const(value: &Json) -> Result<Const, LucyError> {
    Ok(match value {
        Json::Null => Const::Null,
        Json::Bool(b) => Const::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Const::Int(i)
            } else {
                Const::Float(n.as_f64().ok_or_else(|| dump_error("invalid numeric constant"))?)
            }
        }
        Json::String(s) => Const::String(s.clone()),
        Json::Array(items) => {
            let Some(Json::String(tag)) = items.first() else {
                return Err(dump_error("tagged constant missing its tag"));
            };
            match tag.as_str() {
                "global_reference" => Const::GlobalReference,
                "function" => {
                    let payload = items.get(1).ok_or_else(|| dump_error("function constant missing payload"))?;
                    let params_num = payload["params_num"].as_u64().ok_or_else(|| dump_error("function.params_num"))? as usize;
                    let address = payload["address"].as_u64().ok_or_else(|| dump_error("function.address"))? as usize;
                    let is_closure = payload["is_closure"].as_bool().unwrap_or(false);
                    let extend = payload["extend"].as_str().map(str::to_string);
                    Const::Function(FunctionConst { params_num, address, is_closure, extend })
                }
                other => return Err(dump_error(format!("unknown tagged constant '{other}'"))),
            }
        }
        Json::Object(_) => return Err(dump_error("bare object is not a valid constant")),
    })
}

/// Serializes a compiled program to its neutral JSON form.
pub fn dump_program(program: &CodeProgram) -> Json {
    let dumped = DumpedProgram {
        code: program.code.iter().map(dump_op).collect(),
        const_pool: program.const_pool.iter().map(dump_const).collect(),
        name_pool: program.name_pool.clone(),
    };
    serde_json::to_value(dumped).expect("DumpedProgram always serializes")
}

/// Parses a program back from its neutral JSON form.
pub fn load_program(value: &Json) -> Result<CodeProgram, LucyError> {
    let dumped: DumpedProgram =
        serde_json::from_value(value.clone()).map_err(|e| dump_error(format!("malformed program: {e}")))?;

    let code = dumped
        .code
        .iter()
        .map(|(name, arg)| load_op(name, *arg))
        .collect::<Result<Vec<_>, _>>()?;
    let const_pool = dumped.const_pool.iter().map(load_const).collect::<Result<Vec<_>, _>>()?;

    let program = CodeProgram { code, const_pool, name_pool: dumped.name_pool };
    if !program.jumps_resolved() {
        return Err(dump_error("loaded program has an out-of-range jump target"));
    }
    Ok(program)
}

/// Convenience wrapper used by `lucy dump`: pretty-printed JSON text.
pub fn dump_to_string(program: &CodeProgram) -> String {
    serde_json::to_string_pretty(&dump_program(program)).expect("dump_program always serializes")
}

pub fn load_from_str(text: &str) -> Result<CodeProgram, LucyError> {
    let value: Json = serde_json::from_str(text).map_err(|e| dump_error(format!("invalid JSON: {e}")))?;
    load_program(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn round_trips_arithmetic_program() {
        let body = parse("a = 1 + 2 * 3;").unwrap();
        let program = crate::compiler::compile(&body).unwrap();
        let text = dump_to_string(&program);
        let loaded = load_from_str(&text).unwrap();
        assert_eq!(loaded.code.len(), program.code.len());
        assert_eq!(loaded.const_pool, program.const_pool);
        assert_eq!(loaded.name_pool, program.name_pool);
    }

    #[test]
    fn round_trips_closures_and_globals() {
        let body = parse("make = func() { c = 0; return |v| { c = c + v; return c; }; }; global g;").unwrap();
        let program = crate::compiler::compile(&body).unwrap();
        let loaded = load_from_str(&dump_to_string(&program)).unwrap();
        assert_eq!(loaded.const_pool, program.const_pool);
    }

    #[test]
    fn rejects_unknown_opcode_name() {
        let text = r#"{"code":[["NOT_A_REAL_OP", null]],"const_pool":[],"name_pool":[]}"#;
        assert!(load_from_str(text).is_err());
    }
}
