use super::{BinaryName, ClassAccessFlags, ClassData, ClassGraph};
use elsa::FrozenVec;

/// Classes inside `java.*`
pub struct JavaClasses<'g> {
    pub lang: LangClasses<'g>,
    pub io: IoClasses<'g>,
}

/// Classes inside `java.lang.*`
pub struct LangClasses<'g> {
    pub object: &'g ClassData<'g>,
    pub cloneable: &'g ClassData<'g>,
    pub comparable: &'g ClassData<'g>,
    pub char_sequence: &'g ClassData<'g>,
    pub string: &'g ClassData<'g>,
    pub class: &'g ClassData<'g>,
    pub number: &'g ClassData<'g>,
    pub integer: &'g ClassData<'g>,
    pub float: &'g ClassData<'g>,
    pub long: &'g ClassData<'g>,
    pub double: &'g ClassData<'g>,
    pub boolean: &'g ClassData<'g>,
    pub system: &'g ClassData<'g>,
    pub invoke: InvokeClasses<'g>,
    pub throwable: &'g ClassData<'g>,
    pub error: &'g ClassData<'g>,
    pub exception: &'g ClassData<'g>,
    pub runtime_exception: &'g ClassData<'g>,
    pub arithmetic_exception: &'g ClassData<'g>,
    pub array_index_out_of_bounds_exception: &'g ClassData<'g>,
    pub array_store_exception: &'g ClassData<'g>,
    pub class_cast_exception: &'g ClassData<'g>,
    pub illegal_argument_exception: &'g ClassData<'g>,
    pub illegal_monitor_state_exception: &'g ClassData<'g>,
    pub negative_array_size_exception: &'g ClassData<'g>,
    pub null_pointer_exception: &'g ClassData<'g>,
}

/// Classes inside `java.lang.invoke.*`
pub struct InvokeClasses<'g> {
    pub method_type: &'g ClassData<'g>,
    pub method_handle: &'g ClassData<'g>,
}

/// Classes inside `java.io.*`
pub struct IoClasses<'g> {
    pub serializable: &'g ClassData<'g>,
}

const CLASS: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    ClassAccessFlags::PUBLIC.bits() | ClassAccessFlags::SUPER.bits(),
);
const FINAL_CLASS: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    CLASS.bits() | ClassAccessFlags::FINAL.bits(),
);
const ABSTRACT_CLASS: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    CLASS.bits() | ClassAccessFlags::ABSTRACT.bits(),
);
const INTERFACE: ClassAccessFlags = ClassAccessFlags::from_bits_truncate(
    ClassAccessFlags::PUBLIC.bits()
        | ClassAccessFlags::INTERFACE.bits()
        | ClassAccessFlags::ABSTRACT.bits(),
);

impl<'g> JavaClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaClasses<'g> {
        let object = class_graph.add_class(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: FrozenVec::new(),
            access_flags: CLASS,
            fields: FrozenVec::new(),
        });
        let io = IoClasses::add_to_graph(class_graph, object);
        let lang = LangClasses::add_to_graph(class_graph, object, &io);

        JavaClasses { lang, io }
    }
}

impl<'g> LangClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        object: &'g ClassData<'g>,
        io: &IoClasses<'g>,
    ) -> LangClasses<'g> {
        let class = |name: BinaryName, superclass: &'g ClassData<'g>, flags: ClassAccessFlags| {
            class_graph.add_class(ClassData::new(name, superclass, flags))
        };

        let cloneable = class(BinaryName::CLONEABLE, object, INTERFACE);
        let comparable = class(BinaryName::COMPARABLE, object, INTERFACE);
        let char_sequence = class(BinaryName::CHARSEQUENCE, object, INTERFACE);
        let string = class(BinaryName::STRING, object, FINAL_CLASS);
        let class_cls = class(BinaryName::CLASS, object, FINAL_CLASS);
        let number = class(BinaryName::NUMBER, object, ABSTRACT_CLASS);
        let integer = class(BinaryName::INTEGER, number, FINAL_CLASS);
        let float = class(BinaryName::FLOAT, number, FINAL_CLASS);
        let long = class(BinaryName::LONG, number, FINAL_CLASS);
        let double = class(BinaryName::DOUBLE, number, FINAL_CLASS);
        let boolean = class(BinaryName::BOOLEAN, object, FINAL_CLASS);
        let system = class(BinaryName::SYSTEM, object, FINAL_CLASS);
        let invoke = InvokeClasses::add_to_graph(class_graph, object);

        let throwable = class(BinaryName::THROWABLE, object, CLASS);
        let error = class(BinaryName::ERROR, throwable, CLASS);
        let exception = class(BinaryName::EXCEPTION, throwable, CLASS);
        let runtime_exception = class(BinaryName::RUNTIMEEXCEPTION, exception, CLASS);
        let arithmetic_exception =
            class(BinaryName::ARITHMETICEXCEPTION, runtime_exception, CLASS);
        let array_index_out_of_bounds_exception = class(
            BinaryName::ARRAYINDEXOUTOFBOUNDSEXCEPTION,
            runtime_exception,
            CLASS,
        );
        let array_store_exception =
            class(BinaryName::ARRAYSTOREEXCEPTION, runtime_exception, CLASS);
        let class_cast_exception = class(BinaryName::CLASSCASTEXCEPTION, runtime_exception, CLASS);
        let illegal_argument_exception =
            class(BinaryName::ILLEGALARGUMENTEXCEPTION, runtime_exception, CLASS);
        let illegal_monitor_state_exception = class(
            BinaryName::ILLEGALMONITORSTATEEXCEPTION,
            runtime_exception,
            CLASS,
        );
        let negative_array_size_exception =
            class(BinaryName::NEGATIVEARRAYSIZEEXCEPTION, runtime_exception, CLASS);
        let null_pointer_exception =
            class(BinaryName::NULLPOINTEREXCEPTION, runtime_exception, CLASS);

        string.interfaces.push(char_sequence);
        string.interfaces.push(comparable);
        string.interfaces.push(io.serializable);
        number.interfaces.push(io.serializable);
        for boxed in [integer, float, long, double, boolean] {
            boxed.interfaces.push(comparable);
        }
        boolean.interfaces.push(io.serializable);
        throwable.interfaces.push(io.serializable);

        LangClasses {
            object,
            cloneable,
            comparable,
            char_sequence,
            string,
            class: class_cls,
            number,
            integer,
            float,
            long,
            double,
            boolean,
            system,
            invoke,
            throwable,
            error,
            exception,
            runtime_exception,
            arithmetic_exception,
            array_index_out_of_bounds_exception,
            array_store_exception,
            class_cast_exception,
            illegal_argument_exception,
            illegal_monitor_state_exception,
            negative_array_size_exception,
            null_pointer_exception,
        }
    }
}

impl<'g> InvokeClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        object: &'g ClassData<'g>,
    ) -> InvokeClasses<'g> {
        let method_type =
            class_graph.add_class(ClassData::new(BinaryName::METHODTYPE, object, FINAL_CLASS));
        let method_handle = class_graph.add_class(ClassData::new(
            BinaryName::METHODHANDLE,
            object,
            ABSTRACT_CLASS,
        ));

        InvokeClasses {
            method_type,
            method_handle,
        }
    }
}

impl<'g> IoClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>, object: &'g ClassData<'g>) -> IoClasses<'g> {
        let serializable = class_graph.add_class(ClassData::new(
            BinaryName::SERIALIZABLE,
            object,
            INTERFACE,
        ));

        IoClasses { serializable }
    }
}
