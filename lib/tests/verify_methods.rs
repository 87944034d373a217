use classverify::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use classverify::jvm::class_file::MethodRef;
use classverify::jvm::code::{
    ExceptionTableEntry, Instruction, InstructionIndex, InvokeType, MethodBody, OrdComparison,
};
use classverify::jvm::verifier::*;
use classverify::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, Name, RefType, UnqualifiedName};

fn name(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(name.to_string()).unwrap()
}

fn static_method(
    method_name: &str,
    parameters: Vec<FieldType<BinaryName>>,
    return_type: Option<FieldType<BinaryName>>,
) -> MethodSignature {
    MethodSignature {
        class: BinaryName::from_string("test/Methods".to_string()).unwrap(),
        name: name(method_name),
        descriptor: MethodDescriptor {
            parameters,
            return_type,
        },
        is_static: true,
    }
}

fn int() -> FieldType<BinaryName> {
    FieldType::Base(BaseType::Int)
}

fn object_type(class: BinaryName) -> FieldType<BinaryName> {
    FieldType::Ref(RefType::Object(class))
}

fn object_init() -> Instruction {
    Instruction::Invoke(
        InvokeType::Special,
        MethodRef {
            class: RefType::Object(BinaryName::OBJECT),
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            is_interface: false,
        },
    )
}

fn verify_with(
    signature: &MethodSignature,
    body: &MethodBody,
    settings: &Settings,
    lenient: bool,
) -> Verdict {
    let arenas = ClassGraphArenas::new();
    let mut graph = ClassGraph::new(&arenas);
    graph.assume_missing_classes = lenient;
    graph.insert_java_library_types();
    verify_method(signature, body, &graph, settings)
}

fn verify(signature: &MethodSignature, body: &MethodBody) -> Verdict {
    verify_with(signature, body, &Settings::default(), false)
}

fn rejection(verdict: Verdict) -> String {
    match verdict {
        Verdict::Rejected(message) => message,
        other => panic!("Expected a rejection, got {}", other),
    }
}

fn verified(verdict: Verdict) -> VerifiedMethod {
    match verdict {
        Verdict::Verified(verified) => verified,
        other => panic!("Expected the method to verify, got {}", other),
    }
}

#[test]
fn add_two_ints() {
    let signature = static_method("add", vec![int(), int()], Some(int()));
    let body = MethodBody::new(
        vec![
            Instruction::ILoad(0),
            Instruction::ILoad(1),
            Instruction::IAdd,
            Instruction::IReturn,
        ],
        2,
        2,
        vec![],
    );

    let verified = verified(verify(&signature, &body));
    let at_return = verified.in_frame(InstructionIndex(3), None).unwrap();
    let stack: Vec<_> = at_return.stack.iter().cloned().collect();
    assert_eq!(stack, vec![VerificationType::Integer]);
    assert!(verified.advisories().is_empty());
    assert_eq!(verified.frames_at(InstructionIndex(2)).len(), 1);
}

#[test]
fn pop_from_empty_stack() {
    let signature = static_method("pop", vec![], None);
    let body = MethodBody::new(vec![Instruction::Pop, Instruction::Return], 1, 0, vec![]);

    let message = rejection(verify(&signature, &body));
    assert!(message.contains("Cannot consume 1 stack slots"), "{}", message);
    assert!(message.contains("#0 `pop`"), "{}", message);
    assert!(message.contains("test/Methods.pop()V"), "{}", message);
}

#[test]
fn parameters_must_fit_in_locals() {
    let signature = static_method("wide", vec![FieldType::Base(BaseType::Long)], None);
    let body = MethodBody::new(vec![Instruction::Return], 0, 1, vec![]);
    assert!(verify(&signature, &body).is_rejected());
}

#[test]
fn malformed_bodies_are_rejected() {
    let signature = static_method("empty", vec![], None);
    let body = MethodBody::new(vec![Instruction::Nop], 0, 0, vec![]);
    assert!(verify(&signature, &body).is_rejected());
}

#[test]
fn simple_subroutine() {
    let signature = static_method("finally", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::Jsr(InstructionIndex(2)), // 0
            Instruction::Return,                   // 1
            Instruction::AStore(0),                // 2
            Instruction::Ret(0),                   // 3
        ],
        1,
        1,
        vec![],
    );

    let verified = verified(verify(&signature, &body));
    let frames = verified.frames_at(InstructionIndex(2));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, Some(InstructionIndex(0)));
    assert_eq!(
        frames[0].1.stack.peek(0).unwrap(),
        &VerificationType::ReturnAddress(InstructionIndex(1))
    );
    assert!(verified.in_frame(InstructionIndex(1), None).is_some());
}

#[test]
fn subroutine_called_from_two_places() {
    let signature = static_method("twice", vec![int()], Some(int()));
    let body = MethodBody::new(
        vec![
            Instruction::Jsr(InstructionIndex(5)), // 0
            Instruction::ILoad(0),                 // 1
            Instruction::Jsr(InstructionIndex(5)), // 2
            Instruction::Pop,                      // 3
            Instruction::Goto(InstructionIndex(7)), // 4
            Instruction::AStore(1),                // 5
            Instruction::Ret(1),                   // 6
            Instruction::ILoad(0),                 // 7
            Instruction::IReturn,                  // 8
        ],
        2,
        2,
        vec![],
    );

    let verified = verified(verify(&signature, &body));
    let contexts: Vec<_> = verified
        .frames_at(InstructionIndex(6))
        .into_iter()
        .map(|(context, _)| context)
        .collect();
    assert_eq!(
        contexts,
        vec![Some(InstructionIndex(0)), Some(InstructionIndex(2))]
    );

    // Each caller keeps its own stack through the subroutine
    let second_call = verified
        .in_frame(InstructionIndex(6), Some(InstructionIndex(2)))
        .unwrap();
    assert_eq!(second_call.stack.len(), 1);
    let first_call = verified
        .in_frame(InstructionIndex(6), Some(InstructionIndex(0)))
        .unwrap();
    assert!(first_call.stack.is_empty());

    let subroutine = verified.subroutines().get(InstructionIndex(5)).unwrap();
    assert_eq!(subroutine.leaving_ret, Some(InstructionIndex(6)));
    assert!(subroutine.accessed_locals().contains(&1));
}

#[test]
fn recursive_subroutine() {
    let signature = static_method("recursive", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::Jsr(InstructionIndex(2)), // 0
            Instruction::Return,                   // 1
            Instruction::AStore(0),                // 2
            Instruction::Jsr(InstructionIndex(2)), // 3
            Instruction::Ret(0),                   // 4
        ],
        1,
        1,
        vec![],
    );

    let message = rejection(verify(&signature, &body));
    assert!(message.contains("recursive"), "{}", message);
}

#[test]
fn shared_subroutine_code() {
    let signature = static_method("shared", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::Jsr(InstructionIndex(3)),  // 0
            Instruction::Jsr(InstructionIndex(5)),  // 1
            Instruction::Return,                    // 2
            Instruction::AStore(0),                 // 3
            Instruction::Goto(InstructionIndex(6)), // 4
            Instruction::AStore(0),                 // 5
            Instruction::Ret(0),                    // 6
        ],
        1,
        1,
        vec![],
    );

    let message = rejection(verify(&signature, &body));
    assert!(message.contains("more than one subroutine"), "{}", message);
}

#[test]
fn protected_subroutines() {
    let signature = static_method("protected", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::Jsr(InstructionIndex(3)), // 0
            Instruction::Return,                   // 1
            Instruction::AThrow,                   // 2
            Instruction::AStore(0),                // 3
            Instruction::Ret(0),                   // 4
        ],
        1,
        1,
        vec![ExceptionTableEntry {
            start: InstructionIndex(3),
            end: InstructionIndex(4),
            handler: InstructionIndex(2),
            catch_type: None,
        }],
    );

    let message = rejection(verify(&signature, &body));
    assert!(message.contains("protected"), "{}", message);

    let lenient = Settings {
        forbid_protected_subroutines: false,
        ..Settings::default()
    };
    assert!(verify_with(&signature, &body, &lenient, false).is_verified());
}

#[test]
fn catch_all_handler_sees_throwable() {
    let signature = static_method("guarded", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::Nop,    // 0
            Instruction::Return, // 1
            Instruction::AThrow, // 2
        ],
        1,
        0,
        vec![ExceptionTableEntry {
            start: InstructionIndex(0),
            end: InstructionIndex(1),
            handler: InstructionIndex(2),
            catch_type: None,
        }],
    );

    let verified = verified(verify(&signature, &body));
    let handler_frame = verified.in_frame(InstructionIndex(2), None).unwrap();
    let stack: Vec<_> = handler_frame.stack.iter().cloned().collect();
    assert_eq!(stack, vec![VerificationType::object(BinaryName::THROWABLE)]);
}

#[test]
fn typed_handler_keeps_locals() {
    let signature = static_method("typed", vec![int()], Some(int()));
    let body = MethodBody::new(
        vec![
            Instruction::ILoad(0),  // 0
            Instruction::IReturn,   // 1
            Instruction::AStore(1), // 2
            Instruction::ILoad(0),  // 3
            Instruction::IReturn,   // 4
        ],
        1,
        2,
        vec![ExceptionTableEntry {
            start: InstructionIndex(0),
            end: InstructionIndex(2),
            handler: InstructionIndex(2),
            catch_type: Some(BinaryName::ARITHMETICEXCEPTION),
        }],
    );

    let verified = verified(verify(&signature, &body));
    let handler_frame = verified.in_frame(InstructionIndex(2), None).unwrap();
    assert_eq!(handler_frame.locals.get(0).unwrap(), &VerificationType::Integer);
    assert_eq!(
        handler_frame.stack.peek(0).unwrap(),
        &VerificationType::object(BinaryName::ARITHMETICEXCEPTION)
    );
}

#[test]
fn loops_converge() {
    // int total = 0; for (int i = n; i > 0; i--) total += i; return total;
    let signature = static_method("sum", vec![int()], Some(int()));
    let body = MethodBody::new(
        vec![
            Instruction::IConst0,                                        // 0
            Instruction::IStore(1),                                      // 1
            Instruction::ILoad(0),                                       // 2
            Instruction::If(OrdComparison::LE, InstructionIndex(10)),    // 3
            Instruction::ILoad(1),                                       // 4
            Instruction::ILoad(0),                                       // 5
            Instruction::IAdd,                                           // 6
            Instruction::IStore(1),                                      // 7
            Instruction::IInc(0, -1),                                    // 8
            Instruction::Goto(InstructionIndex(2)),                      // 9
            Instruction::ILoad(1),                                       // 10
            Instruction::IReturn,                                        // 11
        ],
        2,
        2,
        vec![],
    );

    let verified = verified(verify(&signature, &body));
    assert!(verified.pump_steps() >= body.len());
    let loop_head = verified.in_frame(InstructionIndex(2), None).unwrap();
    assert_eq!(loop_head.locals.get(1).unwrap(), &VerificationType::Integer);
}

#[test]
fn references_merge_at_joins() {
    // return n == 0 ? new Object() : "string";
    let signature = static_method(
        "pick",
        vec![int()],
        Some(object_type(BinaryName::OBJECT)),
    );
    let body = MethodBody::new(
        vec![
            Instruction::ILoad(0),                                     // 0
            Instruction::If(OrdComparison::NE, InstructionIndex(6)),   // 1
            Instruction::New(RefType::Object(BinaryName::OBJECT)),     // 2
            Instruction::Dup,                                          // 3
            object_init(),                                             // 4
            Instruction::Goto(InstructionIndex(7)),                    // 5
            Instruction::AConstNull,                                   // 6
            Instruction::AReturn,                                      // 7
        ],
        2,
        1,
        vec![],
    );

    let verified = verified(verify(&signature, &body));
    let join = verified.in_frame(InstructionIndex(7), None).unwrap();
    assert_eq!(
        join.stack.peek(0).unwrap(),
        &VerificationType::object(BinaryName::OBJECT)
    );
}

#[test]
fn uninitialized_object_on_backwards_branch() {
    let signature = static_method("allocate", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::New(RefType::Object(BinaryName::OBJECT)), // 0
            Instruction::AStore(0),                                // 1
            Instruction::Goto(InstructionIndex(0)),                // 2
        ],
        1,
        1,
        vec![],
    );

    let message = rejection(verify(&signature, &body));
    assert!(message.contains("Backwards branch"), "{}", message);
}

#[test]
fn uninitialized_objects_stay_uninitialized_in_loops() {
    // The same allocation is still sitting in a local when the loop comes around
    let signature = static_method("spin", vec![int()], None);
    let in_local = MethodBody::new(
        vec![
            Instruction::New(RefType::Object(BinaryName::OBJECT)),   // 0
            Instruction::AStore(1),                                  // 1
            Instruction::ILoad(0),                                   // 2
            Instruction::If(OrdComparison::NE, InstructionIndex(2)), // 3
            Instruction::Return,                                     // 4
        ],
        1,
        2,
        vec![],
    );
    let message = rejection(verify(&signature, &in_local));
    assert!(message.contains("Backwards branch"), "{}", message);
    assert!(message.contains("in the local variables"), "{}", message);

    let on_stack = MethodBody::new(
        vec![
            Instruction::New(RefType::Object(BinaryName::OBJECT)),   // 0
            Instruction::ILoad(0),                                   // 1
            Instruction::If(OrdComparison::NE, InstructionIndex(1)), // 2
            Instruction::Pop,                                        // 3
            Instruction::Return,                                     // 4
        ],
        2,
        1,
        vec![],
    );
    let message = rejection(verify(&signature, &on_stack));
    assert!(message.contains("Backwards branch"), "{}", message);
    assert!(message.contains("on the stack"), "{}", message);
}

#[test]
fn forward_joins_initialize_in_either_order() {
    let signature = static_method("maybe", vec![int()], None);
    let join = |taken: Instruction, fall_through: Instruction| {
        MethodBody::new(
            vec![
                Instruction::New(RefType::Object(BinaryName::OBJECT)),   // 0
                Instruction::Dup,                                        // 1
                Instruction::AStore(1),                                  // 2
                Instruction::ILoad(0),                                   // 3
                Instruction::If(OrdComparison::EQ, InstructionIndex(7)), // 4
                fall_through,                                            // 5
                Instruction::Goto(InstructionIndex(8)),                  // 6
                taken,                                                   // 7
                Instruction::Return,                                     // 8
            ],
            2,
            2,
            vec![],
        )
    };

    // The shorter path reaches the return first, with or without the constructor call
    for body in [
        join(Instruction::Pop, object_init()),
        join(object_init(), Instruction::Pop),
    ] {
        let verified = verified(verify(&signature, &body));
        let at_return = verified.in_frame(InstructionIndex(8), None).unwrap();
        assert_eq!(
            at_return.locals.get(1).unwrap(),
            &VerificationType::object(BinaryName::OBJECT)
        );
    }
}

#[test]
fn ret_outside_of_subroutines() {
    let signature = static_method("stray", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::Jsr(InstructionIndex(2)), // 0
            Instruction::Ret(0),                   // 1
            Instruction::AStore(0),                // 2
            Instruction::Ret(0),                   // 3
        ],
        1,
        1,
        vec![],
    );
    let message = rejection(verify(&signature, &body));
    assert!(message.contains("not part of any subroutine"), "{}", message);
}

#[test]
fn constructed_objects() {
    let signature = static_method("create", vec![], Some(object_type(BinaryName::OBJECT)));
    let body = MethodBody::new(
        vec![
            Instruction::New(RefType::Object(BinaryName::OBJECT)),
            Instruction::Dup,
            object_init(),
            Instruction::AReturn,
        ],
        2,
        0,
        vec![],
    );
    assert!(verify(&signature, &body).is_verified());

    // Returning the object before its constructor ran
    let early = MethodBody::new(
        vec![
            Instruction::New(RefType::Object(BinaryName::OBJECT)),
            Instruction::AReturn,
        ],
        1,
        0,
        vec![],
    );
    let message = rejection(verify(&signature, &early));
    assert!(message.contains("constructor has not been called"), "{}", message);
}

#[test]
fn constructors_must_call_super() {
    let signature = MethodSignature {
        class: BinaryName::from_string("test/Thing".to_string()).unwrap(),
        name: UnqualifiedName::INIT,
        descriptor: MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
        is_static: false,
    };

    let good = MethodBody::new(
        vec![Instruction::ALoad(0), object_init(), Instruction::Return],
        1,
        1,
        vec![],
    );
    let verified = verified(verify_with(&signature, &good, &Settings::default(), true));
    assert_eq!(
        verified
            .out_frame(InstructionIndex(1), None)
            .unwrap()
            .locals
            .get(0)
            .unwrap(),
        &VerificationType::object(signature.class.clone())
    );

    let bad = MethodBody::new(vec![Instruction::Return], 0, 1, vec![]);
    let message = rejection(verify_with(&signature, &bad, &Settings::default(), true));
    assert!(message.contains("did not call a constructor"), "{}", message);
}

#[test]
fn return_types() {
    let returns_int = static_method("number", vec![], Some(int()));
    let null_as_int = MethodBody::new(
        vec![Instruction::AConstNull, Instruction::IReturn],
        1,
        0,
        vec![],
    );
    assert!(verify(&returns_int, &null_as_int).is_rejected());

    let areturn_in_int = MethodBody::new(
        vec![Instruction::AConstNull, Instruction::AReturn],
        1,
        0,
        vec![],
    );
    assert!(verify(&returns_int, &areturn_in_int).is_rejected());

    let returns_void = static_method("nothing", vec![], None);
    let value_from_void = MethodBody::new(
        vec![Instruction::IConst0, Instruction::IReturn],
        1,
        0,
        vec![],
    );
    assert!(verify(&returns_void, &value_from_void).is_rejected());
    let bare = MethodBody::new(vec![Instruction::Return], 0, 0, vec![]);
    assert!(verify(&returns_void, &bare).is_verified());

    // An `Object` is not necessarily a `String`
    let returns_string = static_method("text", vec![], Some(object_type(BinaryName::STRING)));
    let object_as_string = MethodBody::new(
        vec![
            Instruction::New(RefType::Object(BinaryName::OBJECT)),
            Instruction::Dup,
            object_init(),
            Instruction::AReturn,
        ],
        2,
        0,
        vec![],
    );
    let message = rejection(verify(&returns_string, &object_as_string));
    assert!(message.contains("Returned type"), "{}", message);

    let null_as_string = MethodBody::new(
        vec![Instruction::AConstNull, Instruction::AReturn],
        1,
        0,
        vec![],
    );
    assert!(verify(&returns_string, &null_as_string).is_verified());
}

#[test]
fn missing_classes_are_internal_errors() {
    let signature = static_method("missing", vec![], None);
    let body = MethodBody::new(
        vec![
            Instruction::New(RefType::Object(
                BinaryName::from_string("does/not/Exist".to_string()).unwrap(),
            )),
            Instruction::Pop,
            Instruction::Return,
        ],
        1,
        0,
        vec![],
    );
    assert!(matches!(
        verify(&signature, &body),
        Verdict::InternalError(_)
    ));
    assert!(verify_with(&signature, &body, &Settings::default(), true).is_verified());
}
