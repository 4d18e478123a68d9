// Printing modules back into the text format accepted by the parser.

use super::*;

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Ptr => write!(f, "ptr"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Void => write!(f, "void"),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Undef => write!(f, "undef"),
            Constant::Int(n) => write!(f, "{n}"),
        }
    }
}

impl Function {
    // The textual form of a value used inside this function.
    pub fn value_to_string(&self, value: &Value) -> String {
        match value {
            Value::Func(id) => format!("@{id}"),
            Value::Inst(id) => self
                .block(&id.block)
                .and_then(|b| b.insts.get(id.index))
                .and_then(|inst| inst.result.as_ref())
                .map(|name| format!("%{name}"))
                .unwrap_or_else(|| format!("%<{id}>")),
            Value::Param { index, .. } => self
                .params
                .get(*index)
                .map(|p| format!("%{}", p.name))
                .unwrap_or_else(|| format!("%<arg{index}>")),
            Value::Const(c) => c.to_string(),
        }
    }

    fn inst_to_string(&self, inst: &Inst) -> String {
        let values = |vs: &[Value]| {
            vs.iter()
                .map(|v| self.value_to_string(v))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut s = match &inst.result {
            Some(name) => format!("%{name} = "),
            None => String::new(),
        };

        match &inst.kind {
            Instruction::Call { callee, args } => {
                s += &format!("call {}({})", self.value_to_string(callee), values(args));
            }
            Instruction::Return { value: None } => s += "ret",
            Instruction::Return { value: Some(v) } => {
                s += &format!("ret {}", self.value_to_string(v));
            }
            Instruction::Join { incoming } => {
                let pairs = incoming
                    .iter()
                    .map(|(bb, v)| format!("[{}, {bb}]", self.value_to_string(v)))
                    .collect::<Vec<_>>()
                    .join(", ");
                s += &format!("phi {pairs}");
            }
            Instruction::Other {
                opcode,
                operands,
                successors,
            } => {
                s += opcode;
                if !operands.is_empty() {
                    s += &format!(" {}", values(operands));
                }
                if !successors.is_empty() {
                    let targets = successors.iter().map(|bb| bb.to_string()).collect::<Vec<_>>();
                    s += &format!(" to {}", targets.join(", "));
                }
            }
        }

        if let Some(line) = inst.line {
            s += &format!(" !line {line}");
        }

        s
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let debug_name = match &self.debug_name {
            Some(name) => format!(" !name \"{name}\""),
            None => String::new(),
        };

        if self.is_declaration() {
            let params = self
                .params
                .iter()
                .map(|p| p.ty.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return writeln!(f, "declare {} @{}({params}){debug_name}", self.ret_ty, self.id);
        }

        let params = self
            .params
            .iter()
            .map(|p| format!("{} %{}", p.ty, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "define {} @{}({params}){debug_name} {{", self.ret_ty, self.id)?;

        for block in &self.blocks {
            writeln!(f, "{}:", block.id)?;
            for inst in &block.insts {
                writeln!(f, "  {}", self.inst_to_string(inst))?;
            }
        }

        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "module \"{name}\"")?;
            writeln!(f)?;
        }

        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{function}")?;
        }

        Ok(())
    }
}
